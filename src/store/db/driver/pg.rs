use std::time::Duration;

use async_trait::async_trait;
use fieldx::fxstruct;
use sea_orm::ConnectOptions;
use sea_orm::DatabaseConnection;
use tracing::error;

use super::DatabaseDriver;
use crate::error::StoreError;

#[derive(Debug)]
#[fxstruct(sync, rc, no_new, builder)]
pub struct Pg {
    host:     String,
    port:     u16,
    user:     String,
    password: String,
    database: String,
    #[fieldx(get(copy), default(20))]
    max_connections: u32,
    #[fieldx(inner_mut, get(off), set, builder(off))]
    connection: DatabaseConnection,
}

impl Pg {
    pub async fn connect(&self) -> Result<(), StoreError> {
        let schema = format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        );
        let mut opts = ConnectOptions::new(&schema);
        opts.max_connections(self.max_connections())
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(60))
            .test_before_acquire(true)
            .sqlx_logging(false);

        self.set_connection(
            sea_orm::Database::connect(opts)
                .await
                .inspect_err(|e| error!("Error connecting to database {}@{}: {e}", self.database, self.host))?,
        );

        Ok(())
    }
}

#[async_trait]
impl DatabaseDriver for Pg {
    fn name(&self) -> &'static str {
        "pg"
    }

    fn connection(&self) -> DatabaseConnection {
        self.connection.read().clone()
    }

    async fn configure(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
