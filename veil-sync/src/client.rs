//! Remote store clients.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use serde_json::json;
use tracing::{debug, warn};

use veil_core::config::SyncConfig;
use veil_core::types::UserHash;

use crate::error::SyncError;
use crate::types::{LeaderboardEntry, Projection, RankInfo};

/// Call contract of the remote leaderboard.
pub trait RemoteStore: Send + Sync {
    /// Insert or replace the row keyed by `projection.user_hash`.
    fn upsert(&self, projection: &Projection) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Top `limit` rows by score, highest first.
    fn leaderboard(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LeaderboardEntry>, SyncError>> + Send;

    /// Position of one visitor.
    fn rank_of(&self, user_hash: &UserHash) -> impl Future<Output = Result<RankInfo, SyncError>> + Send;
}

impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    fn upsert(&self, projection: &Projection) -> impl Future<Output = Result<(), SyncError>> + Send {
        (**self).upsert(projection)
    }

    fn leaderboard(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LeaderboardEntry>, SyncError>> + Send {
        (**self).leaderboard(limit)
    }

    fn rank_of(&self, user_hash: &UserHash) -> impl Future<Output = Result<RankInfo, SyncError>> + Send {
        (**self).rank_of(user_hash)
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// PostgREST-style client: table upserts, ordered selects, one RPC for rank.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    http: Client,
    base_url: String,
    api_key: String,
    table: String,
    timeout: Duration,
}

impl HttpRemote {
    /// Create a client for `base_url`.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

impl RemoteStore for HttpRemote {
    async fn upsert(&self, projection: &Projection) -> Result<(), SyncError> {
        let url = format!("{}?on_conflict=userHash", self.table_url());
        let start = Instant::now();
        let resp = self
            .request(self.http.post(&url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(projection)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Leaderboard upsert rejected");
            return Err(SyncError::Status(status.as_u16()));
        }
        debug!(elapsed_ms = start.elapsed().as_millis(), "Leaderboard upsert accepted");
        Ok(())
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let url = format!("{}?select=*&order=score.desc&limit={limit}", self.table_url());
        let resp = self.request(self.http.get(&url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }
        resp.json()
            .await
            .map_err(|e| SyncError::ParseError(e.to_string()))
    }

    async fn rank_of(&self, user_hash: &UserHash) -> Result<RankInfo, SyncError> {
        let url = format!("{}/rest/v1/rpc/get_user_rank", self.base_url);
        let resp = self
            .request(self.http.post(&url))
            .json(&json!({ "p_user_hash": user_hash.as_str() }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }

        // The RPC returns either a bare object or a one-row array.
        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SyncError::ParseError(e.to_string()))?;
        let row = match value {
            serde_json::Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
            serde_json::Value::Array(_) => return Ok(RankInfo::default()),
            other => other,
        };
        serde_json::from_value(row).map_err(|e| SyncError::ParseError(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Provider selection
// ---------------------------------------------------------------------------

/// Remote store chosen from configuration.
#[derive(Debug, Clone)]
pub enum Remote {
    /// Live HTTP backend.
    Http(HttpRemote),
    /// No backend configured; every call reports [`SyncError::Unavailable`].
    Disabled,
}

impl Remote {
    /// Build from the `[sync]` section.
    ///
    /// # Errors
    ///
    /// [`SyncError::ConfigError`] for an unknown provider or an `http`
    /// provider without a base URL.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        match config.provider.as_str() {
            "none" | "" => Ok(Self::Disabled),
            "http" if config.base_url.is_empty() => Err(SyncError::ConfigError(
                "sync.base_url is required for the http provider".into(),
            )),
            "http" => Ok(Self::Http(HttpRemote::new(
                &config.base_url,
                &config.api_key,
                &config.table,
                config.request_timeout_ms,
            ))),
            other => Err(SyncError::ConfigError(format!("unknown sync provider: {other}"))),
        }
    }
}

fn disabled() -> SyncError {
    SyncError::Unavailable("no remote store configured".into())
}

impl RemoteStore for Remote {
    async fn upsert(&self, projection: &Projection) -> Result<(), SyncError> {
        match self {
            Self::Http(http) => http.upsert(projection).await,
            Self::Disabled => Err(disabled()),
        }
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, SyncError> {
        match self {
            Self::Http(http) => http.leaderboard(limit).await,
            Self::Disabled => Err(disabled()),
        }
    }

    async fn rank_of(&self, user_hash: &UserHash) -> Result<RankInfo, SyncError> {
        match self {
            Self::Http(http) => http.rank_of(user_hash).await,
            Self::Disabled => Err(disabled()),
        }
    }
}
