//! Upstream LMS access.
pub mod model;
pub mod moodle;

use std::future::Future;
use std::time::Duration;

use crate::error::UpstreamError;

pub use moodle::MoodleClient;

/// Bound an upstream call. An elapsed limit becomes [`UpstreamError::Timeout`] and is handled like any other
/// upstream failure.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| UpstreamError::Timeout(limit))?
}
