//! Fingerprint oracle
//!
//! Reports the upstream "last successful sync" token. A change of token
//! means historical records may have been recomputed.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::fetch::ApiClient;
use crate::types::Fingerprint;

/// Body of `GET /last_success`
#[derive(Debug, Clone, Deserialize)]
pub struct LastSuccess {
    pub overall_last_sync: String,
}

/// Source of the current upstream fingerprint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FingerprintOracle: Send + Sync {
    async fn current(&self) -> SyncResult<Fingerprint>;
}

/// Oracle backed by the pipeline backend
#[derive(Debug, Clone)]
pub struct HttpFingerprintOracle {
    api: ApiClient,
}

impl HttpFingerprintOracle {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

fn fingerprint_from(body: LastSuccess) -> SyncResult<Fingerprint> {
    let token = body.overall_last_sync.trim();
    if token.is_empty() {
        return Err(SyncError::Decode(serde::de::Error::custom(
            "overall_last_sync is empty",
        )));
    }
    Ok(Fingerprint::new(token))
}

#[async_trait]
impl FingerprintOracle for HttpFingerprintOracle {
    async fn current(&self) -> SyncResult<Fingerprint> {
        let body: LastSuccess = self.api.get_json("last_success", &[]).await?;
        let fingerprint = fingerprint_from(body)?;
        debug!(fingerprint = %fingerprint, "Upstream fingerprint read");
        Ok(fingerprint)
    }
}
