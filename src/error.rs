//! Error type shared by the cache store and the upstream clients

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("cache io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry {key} unusable: {reason}")]
    Cache { key: String, reason: String },
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
