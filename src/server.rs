//! HTTP surface: one action-dispatch endpoint plus a health probe.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Query as QueryParams;
use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use tracing::info;

use crate::action::Action;
use crate::error::ServiceError;
use crate::service::CacheService;

pub const API_PATH: &str = "/api/moodle";
pub const HEALTH_PATH: &str = "/health";

const NO_STORE: &str = "no-store";

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        }
        else {
            StatusCode::BAD_GATEWAY
        };

        (
            status,
            [(CACHE_CONTROL, HeaderValue::from_static(NO_STORE))],
            Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

pub fn router(service: Arc<CacheService>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route(API_PATH, get(api_handler))
        .route(HEALTH_PATH, get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn api_handler(
    State(service): State<Arc<CacheService>>,
    QueryParams(params): QueryParams<HashMap<String, String>>,
) -> Result<Response, ServiceError> {
    let action = Action::from_params(&params)?;
    let reply = service.handle(action).await?;

    let cache_control = if reply.is_cacheable() {
        HeaderValue::from_str(&service.policy().cache_control()).unwrap_or(HeaderValue::from_static(NO_STORE))
    }
    else {
        HeaderValue::from_static(NO_STORE)
    };

    Ok(([(CACHE_CONTROL, cache_control)], Json(reply.to_envelope())).into_response())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Serve until Ctrl+C or SIGTERM, then let in-flight requests finish.
pub async fn serve(listener: TcpListener, service: Arc<CacheService>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Server running on {addr}");
    }

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                error!("Failed to install Ctrl+C handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::signal;
        use tokio::signal::unix::SignalKind;

        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                error!("Failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
