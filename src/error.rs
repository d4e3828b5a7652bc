use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("LMS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LMS function '{function}' answered with HTTP status {status}")]
    Status { function: String, status: u16 },

    #[error("LMS function '{function}' raised {errorcode}: {message}")]
    Api {
        function:  String,
        errorcode: String,
        message:   String,
    },

    #[error("Malformed LMS response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("LMS call timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    #[error("Cached value cannot be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("Missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("Invalid value '{value}' for parameter '{name}'")]
    InvalidParameter { name: &'static str, value: String },

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Failed to load data from the LMS: {0}")]
    Upstream(Arc<UpstreamError>),
}

impl ServiceError {
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Upstream(_))
    }
}

impl From<UpstreamError> for ServiceError {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(Arc::new(err))
    }
}

impl From<Arc<UpstreamError>> for ServiceError {
    fn from(err: Arc<UpstreamError>) -> Self {
        Self::Upstream(err)
    }
}
