//! # Veil Core Library
//!
//! Client-resident narrative progression and trust state for a single
//! visitor identity.
//!
//! The engine accumulates interaction history in one durable aggregate and
//! drives several independent narrative subsystems from it:
//!
//! - **State**: the [`UserState`] aggregate with monotonic history
//! - **Trust**: accumulated score and the derived [`Rank`] ladder
//! - **Seeds**: planted phrases that grow with engagement and decay with neglect
//! - **Whispers**: static fragments that are either found or not
//! - **Diary**: entries, some of which expire after a fixed window
//! - **Masks**: unlockable personas, at most one active
//! - **Temporal**: divergent memory versions, deliberately unreconciled
//! - **Scheduler**: cooldown + probability gated narrative events
//!
//! Persistence goes through a single [`kv::KeyValueStore`]; the
//! [`store::StateStore`] layers versioned, self-healing loads on top.

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod diary;
pub mod error;
pub mod kv;
pub mod masks;
pub mod migration;
pub mod narrative;
pub mod scheduler;
pub mod seeds;
pub mod state;
pub mod store;
pub mod temporal;
pub mod trust;
pub mod types;
pub mod whispers;

pub use config::VeilConfig;
pub use error::{Result, VeilError};
pub use state::UserState;
pub use trust::{Rank, TrustLevel};
pub use types::*;
