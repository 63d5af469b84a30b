//! Wire types shared with the remote leaderboard.

use serde::{Deserialize, Serialize};

use veil_core::config::TrustWeights;
use veil_core::state::UserState;
use veil_core::trust;
use veil_core::types::{Identity, Timestamp};

/// Flattened, derived view of a visitor pushed upstream.
///
/// Field names follow the remote table's columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    /// Stable anonymous identifier; the upsert key.
    pub user_hash: String,
    /// Accumulated trust score.
    pub score: i64,
    /// Rank label for `score`.
    pub rank: String,
    /// Distinct pages visited.
    pub pages_visited: u64,
    /// Console commands found.
    pub console_commands_found: u64,
    /// First session, epoch milliseconds.
    pub first_visit: Timestamp,
    /// Latest session, epoch milliseconds.
    pub last_visit: Timestamp,
    /// Whether the visitor wrote their legacy.
    pub legacy_written: bool,
}

impl Projection {
    /// Derive the projection from local state.
    #[must_use]
    pub fn from_state(state: &UserState, identity: &Identity, weights: &TrustWeights) -> Self {
        let score = trust::score(state, weights);
        Self {
            user_hash: identity.user_hash.as_str().to_string(),
            score,
            rank: trust::rank(score).label().to_string(),
            pages_visited: state.pages_visited() as u64,
            console_commands_found: state.console_flag_count() as u64,
            first_visit: state.first_visit(),
            last_visit: state.last_visit(),
            legacy_written: state.legacy_written(),
        }
    }
}

/// One leaderboard row as returned by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderboardEntry {
    /// Anonymous identifier.
    pub user_hash: String,
    /// Score.
    pub score: i64,
    /// Rank label.
    pub rank: String,
    /// Distinct pages visited.
    pub pages_visited: u64,
    /// Console commands found.
    pub console_commands_found: u64,
    /// Whether a legacy was written.
    pub legacy_written: bool,
}

/// Where a visitor sits on the leaderboard. Zero means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankInfo {
    /// 1-based position.
    pub position: u64,
    /// Rows on the board.
    pub total: u64,
}
