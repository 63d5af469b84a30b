//! Sync error types.

use thiserror::Error;

/// Errors that can occur while talking to the remote leaderboard.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed.
    #[error("Sync request failed: {0}")]
    RequestFailed(String),

    /// Request timed out.
    #[error("Sync request timed out")]
    Timeout,

    /// Remote store is unreachable or not configured.
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// Remote response was not the expected JSON.
    #[error("Failed to parse remote response: {0}")]
    ParseError(String),

    /// Remote answered with a non-success status.
    #[error("Remote store returned HTTP {0}")]
    Status(u16),

    /// Configuration error.
    #[error("Sync configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_connect() {
            SyncError::Unavailable(err.to_string())
        } else if err.is_decode() {
            SyncError::ParseError(err.to_string())
        } else {
            SyncError::RequestFailed(err.to_string())
        }
    }
}
