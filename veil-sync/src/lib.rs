//! # veil-sync: Remote Leaderboard Sync
//!
//! Pushes a flattened projection of the visitor's trust state to a remote
//! leaderboard and reads rankings back. The remote side is a derived cache:
//! nothing read from it ever flows back into local narrative state.
//!
//! - **Upserts** are keyed by the stable anonymous `user_hash` and gated by
//!   a fixed cooldown, so bursts of activity cost at most one request.
//! - **Reads** are best-effort and degrade to empty or zero values.
//! - **Transport** sits behind [`RemoteStore`]; [`HttpRemote`] speaks a
//!   PostgREST-style API and [`Remote::Disabled`] turns sync off.

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod service;
pub mod types;

pub use client::{HttpRemote, Remote, RemoteStore};
pub use error::SyncError;
pub use service::{SyncOutcome, SyncService};
pub use types::{LeaderboardEntry, Projection, RankInfo};
