//! The per-visitor root aggregate.
//!
//! [`UserState`] is the only record most collaborators ever read. Its
//! history-bearing fields are private and only reachable through additive
//! mutators, so no narrative action can remove something a visitor already
//! earned: flags never unset, sets never shrink, counters never decrease.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::trust::TrustLevel;
use crate::types::Timestamp;

/// Event-counter prefix for page visits.
pub const VISITED_PREFIX: &str = "visited_";
/// Event-counter prefix for console commands.
pub const COMMAND_PREFIX: &str = "command_";
/// Event-counter prefix for narrative bonuses.
pub const BONUS_PREFIX: &str = "bonus_";
/// Event key set once a visitor has written their legacy.
pub const LEGACY_WRITTEN: &str = "legacy_written";

/// Persisted trust snapshot. Written only through [`crate::trust::refresh_trust`]
/// and [`UserState::award_bonus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustState {
    /// Last computed score.
    #[serde(default)]
    pub score: i64,
    /// Level derived from `score`.
    #[serde(default)]
    pub level: TrustLevel,
    /// One-off bonus points that cannot be rebuilt from counters.
    #[serde(default)]
    pub bonus_points: i64,
}

impl Default for TrustState {
    fn default() -> Self {
        Self {
            score: 0,
            level: TrustLevel::Low,
            bonus_points: 0,
        }
    }
}

/// Book codes the visitor has unlocked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookCodes {
    #[serde(default, rename = "unlockedCodes")]
    unlocked_codes: BTreeSet<String>,
}

impl BookCodes {
    /// Unlocked codes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.unlocked_codes.iter().map(String::as_str)
    }

    /// Number of unlocked codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.unlocked_codes.len()
    }

    /// Whether nothing is unlocked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unlocked_codes.is_empty()
    }

    /// Whether `code` is unlocked.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.unlocked_codes.contains(code)
    }
}

/// Layered clues the visitor has discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredClues {
    #[serde(default, rename = "discoveredClues")]
    discovered_clues: BTreeSet<String>,
}

impl LayeredClues {
    /// Discovered clues in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.discovered_clues.iter().map(String::as_str)
    }

    /// Number of discovered clues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.discovered_clues.len()
    }

    /// Whether nothing is discovered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.discovered_clues.is_empty()
    }

    /// Whether `clue` was discovered.
    #[must_use]
    pub fn contains(&self, clue: &str) -> bool {
        self.discovered_clues.contains(clue)
    }
}

/// Root aggregate, one per browser identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    #[serde(default)]
    visit_count: u64,
    #[serde(default)]
    first_visit: Timestamp,
    #[serde(default)]
    last_visit: Timestamp,
    /// Trust snapshot, see [`crate::trust`].
    #[serde(default)]
    pub trust: TrustState,
    #[serde(default)]
    console_flags: BTreeMap<String, bool>,
    #[serde(default)]
    book_codes: BookCodes,
    #[serde(default)]
    layered_clues: LayeredClues,
    #[serde(default)]
    events: BTreeMap<String, u64>,
}

impl UserState {
    /// Zero-value state, as used for first visits and corrupt blobs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Number of recorded sessions.
    #[must_use]
    pub fn visit_count(&self) -> u64 {
        self.visit_count
    }

    /// First recorded session (epoch if never visited).
    #[must_use]
    pub fn first_visit(&self) -> Timestamp {
        self.first_visit
    }

    /// Most recent recorded session.
    #[must_use]
    pub fn last_visit(&self) -> Timestamp {
        self.last_visit
    }

    /// Console flags, `true` once a command was found.
    #[must_use]
    pub fn console_flags(&self) -> &BTreeMap<String, bool> {
        &self.console_flags
    }

    /// Whether a console command has been found.
    #[must_use]
    pub fn has_console_flag(&self, command: &str) -> bool {
        self.console_flags.get(command).copied().unwrap_or(false)
    }

    /// Number of console flags set to `true`.
    #[must_use]
    pub fn console_flag_count(&self) -> usize {
        self.console_flags.values().filter(|v| **v).count()
    }

    /// Unlocked book codes.
    #[must_use]
    pub fn book_codes(&self) -> &BookCodes {
        &self.book_codes
    }

    /// Discovered layered clues.
    #[must_use]
    pub fn layered_clues(&self) -> &LayeredClues {
        &self.layered_clues
    }

    /// Append-only event counters.
    #[must_use]
    pub fn events(&self) -> &BTreeMap<String, u64> {
        &self.events
    }

    /// Occurrences recorded for `key`.
    #[must_use]
    pub fn event_count(&self, key: &str) -> u64 {
        self.events.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct pages ever visited.
    #[must_use]
    pub fn pages_visited(&self) -> usize {
        self.events
            .keys()
            .filter(|k| k.starts_with(VISITED_PREFIX))
            .count()
    }

    /// Whether the visitor has left their legacy.
    #[must_use]
    pub fn legacy_written(&self) -> bool {
        self.event_count(LEGACY_WRITTEN) > 0
    }

    // ------------------------------------------------------------------
    // Additive mutators
    // ------------------------------------------------------------------

    /// Start a new session at `now`: bump the visit counter and stamp the
    /// visit window. `last_visit` never moves backwards.
    pub fn begin_visit(&mut self, now: Timestamp) {
        self.visit_count += 1;
        if self.first_visit == Timestamp::EPOCH || now < self.first_visit {
            self.first_visit = now;
        }
        self.last_visit = self.last_visit.max(now);
    }

    /// Mark a console command as found. Returns `true` the first time.
    pub fn set_console_flag(&mut self, command: impl Into<String>) -> bool {
        let command = command.into();
        let first = !self.has_console_flag(&command);
        self.console_flags.insert(command, true);
        first
    }

    /// Unlock a book code. Returns `true` if it was new.
    pub fn unlock_book_code(&mut self, code: impl Into<String>) -> bool {
        self.book_codes.unlocked_codes.insert(code.into())
    }

    /// Record a discovered clue. Returns `true` if it was new.
    pub fn discover_clue(&mut self, clue: impl Into<String>) -> bool {
        self.layered_clues.discovered_clues.insert(clue.into())
    }

    /// Increment the counter for `key` and return the new count.
    pub fn record_event(&mut self, key: impl Into<String>) -> u64 {
        let count = self.events.entry(key.into()).or_insert(0);
        *count += 1;
        *count
    }

    /// Add a one-off trust bonus and count it under `bonus_<key>`.
    /// Negative awards are ignored.
    pub fn award_bonus(&mut self, key: &str, points: i64) {
        if points <= 0 {
            return;
        }
        self.trust.bonus_points += points;
        self.record_event(format!("{BONUS_PREFIX}{key}"));
    }

    /// Record that the visitor left their legacy.
    pub fn mark_legacy_written(&mut self) {
        self.record_event(LEGACY_WRITTEN);
    }

    /// Fold `other` into `self` without losing anything either side knows.
    ///
    /// Used when migrating legacy standalone keys.
    pub fn absorb(&mut self, other: &Self) {
        self.visit_count = self.visit_count.max(other.visit_count);
        if other.first_visit != Timestamp::EPOCH
            && (self.first_visit == Timestamp::EPOCH || other.first_visit < self.first_visit)
        {
            self.first_visit = other.first_visit;
        }
        self.last_visit = self.last_visit.max(other.last_visit);
        for (flag, set) in &other.console_flags {
            if *set {
                self.console_flags.insert(flag.clone(), true);
            } else {
                self.console_flags.entry(flag.clone()).or_insert(false);
            }
        }
        self.book_codes
            .unlocked_codes
            .extend(other.book_codes.unlocked_codes.iter().cloned());
        self.layered_clues
            .discovered_clues
            .extend(other.layered_clues.discovered_clues.iter().cloned());
        for (key, count) in &other.events {
            let mine = self.events.entry(key.clone()).or_insert(0);
            *mine = (*mine).max(*count);
        }
        self.trust.bonus_points = self.trust.bonus_points.max(other.trust.bonus_points);
    }

    /// Whether `self` retains every piece of history recorded in `earlier`.
    #[must_use]
    pub fn extends(&self, earlier: &Self) -> bool {
        self.visit_count >= earlier.visit_count
            && earlier
                .console_flags
                .iter()
                .filter(|(_, set)| **set)
                .all(|(flag, _)| self.has_console_flag(flag))
            && earlier
                .book_codes
                .unlocked_codes
                .is_subset(&self.book_codes.unlocked_codes)
            && earlier
                .layered_clues
                .discovered_clues
                .is_subset(&self.layered_clues.discovered_clues)
            && earlier
                .events
                .iter()
                .all(|(k, n)| self.event_count(k) >= *n)
    }
}
