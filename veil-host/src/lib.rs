//! # veil-host: Application Context for Veil
//!
//! The layer a renderer talks to. It wires the game-agnostic `veil-core`
//! engine and the `veil-sync` leaderboard client into one explicitly
//! constructed [`AppContext`], and drives the narrative scheduler on tokio
//! timers.
//!
//! ```text
//!   renderer ──UserAction──▶ AppContext ──▶ StateStore ──▶ KeyValueStore
//!      ▲                         │
//!      │                         ├──▶ Scheduler ──▶ EventSink ──┐
//!      └──── NarrativeEvent ─────┼──────────────────────────────┘
//!                                └──▶ SyncService ──▶ RemoteStore
//! ```
//!
//! ## Modules
//!
//! - `context`: [`AppContext`], the single owner of all collaborators
//! - `events`: [`UserAction`], what the renderer reports
//! - `runner`: [`SchedulerRunner`], cancellable timer tasks
//! - `logging`: tracing subscriber setup

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod events;
pub mod logging;
pub mod runner;

pub use context::{AppContext, DefaultContext};
pub use events::UserAction;
pub use logging::init_tracing;
pub use runner::{RunnerHandle, SchedulerRunner};
