//! Cooldown-gated sync service.
//!
//! The cooldown is stamped when an upsert is *attempted*, not when it
//! succeeds. A failed push therefore waits for the next natural window;
//! there is no retry queue and no backoff.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use veil_core::config::{SyncConfig, TrustWeights};
use veil_core::state::UserState;
use veil_core::types::{Identity, Timestamp};

use crate::client::RemoteStore;
use crate::types::{LeaderboardEntry, Projection, RankInfo};

/// Result of a [`SyncService::sync`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The projection was upserted.
    Pushed,
    /// Skipped; the previous attempt is too recent.
    CoolingDown,
    /// Attempted and failed; logged and swallowed.
    Failed,
}

/// Pushes projections upstream and serves best-effort reads.
#[derive(Debug)]
pub struct SyncService<R> {
    remote: R,
    weights: TrustWeights,
    cooldown_ms: i64,
    last_attempt: Mutex<Option<Timestamp>>,
}

impl<R: RemoteStore> SyncService<R> {
    /// Wrap a remote store.
    pub fn new(remote: R, config: &SyncConfig, weights: TrustWeights) -> Self {
        Self {
            remote,
            weights,
            cooldown_ms: i64::try_from(config.cooldown_secs.saturating_mul(1000))
                .unwrap_or(i64::MAX),
            last_attempt: Mutex::new(None),
        }
    }

    /// The underlying remote.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Time of the last upsert attempt.
    pub fn last_attempt(&self) -> Option<Timestamp> {
        *self.last_attempt.lock()
    }

    /// Claim the sync slot at `now` if the cooldown has elapsed.
    fn try_claim(&self, now: Timestamp) -> bool {
        let mut last = self.last_attempt.lock();
        if let Some(prev) = *last {
            if now.millis_since(prev) <= self.cooldown_ms {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    /// Push the projection of `state` unless the cooldown is active. Never fails.
    pub async fn sync(&self, state: &UserState, identity: &Identity, now: Timestamp) -> SyncOutcome {
        if !self.try_claim(now) {
            debug!("Sync skipped; cooling down");
            return SyncOutcome::CoolingDown;
        }

        let projection = Projection::from_state(state, identity, &self.weights);
        match self.remote.upsert(&projection).await {
            Ok(()) => {
                info!(score = projection.score, rank = %projection.rank, "Leaderboard synced");
                SyncOutcome::Pushed
            }
            Err(e) => {
                warn!(error = %e, "Leaderboard sync failed; will retry next window");
                SyncOutcome::Failed
            }
        }
    }

    /// Top `limit` rows, or empty on any failure.
    pub async fn fetch_leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.remote.leaderboard(limit).await.unwrap_or_else(|e| {
            warn!(error = %e, "Leaderboard read failed");
            Vec::new()
        })
    }

    /// This visitor's position, or zero on any failure.
    pub async fn fetch_rank(&self, identity: &Identity) -> RankInfo {
        self.remote
            .rank_of(&identity.user_hash)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Rank read failed");
                RankInfo::default()
            })
    }
}
