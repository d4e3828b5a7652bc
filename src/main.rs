use lms_catalog_cache::app::CatalogApp;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    CatalogApp::from_env()?.execute().await
}
