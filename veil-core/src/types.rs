//! Core type definitions shared by every Veil subsystem.

use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds in one day.
pub const MS_PER_DAY: i64 = 86_400_000;
/// Milliseconds in one hour.
pub const MS_PER_HOUR: i64 = 3_600_000;
/// Milliseconds in one minute.
pub const MS_PER_MINUTE: i64 = 60_000;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Wall-clock instant in milliseconds since the Unix epoch.
///
/// Serialised as a bare integer so persisted blobs stay compact and
/// comparable across schema versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The epoch itself; used as the zero-value for never-set stamps.
    pub const EPOCH: Self = Self(0);

    /// Build a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Epoch milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier` (zero if `earlier` is in the future).
    #[must_use]
    pub fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0).max(0)
    }

    /// Fractional days elapsed since `earlier`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn days_since(self, earlier: Self) -> f64 {
        self.0.saturating_sub(earlier.0) as f64 / MS_PER_DAY as f64
    }

    /// This instant shifted forward by `ms` milliseconds.
    #[must_use]
    pub const fn plus_millis(self, ms: i64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Minute of the day (0..1440) after applying a fixed UTC offset.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn minute_of_day(self, utc_offset_minutes: i32) -> u16 {
        let shifted = self.0 + i64::from(utc_offset_minutes) * MS_PER_MINUTE;
        (shifted.rem_euclid(MS_PER_DAY) / MS_PER_MINUTE) as u16
    }

    /// Hour of the day (0..24) after applying a fixed UTC offset.
    #[must_use]
    pub fn hour_of_day(self, utc_offset_minutes: i32) -> u8 {
        let shifted = self.0 + i64::from(utc_offset_minutes) * MS_PER_MINUTE;
        DateTime::<Utc>::from_timestamp_millis(shifted).map_or(0, |dt| {
            u8::try_from(dt.hour()).unwrap_or_default()
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::<Utc>::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a planted seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeedId(pub Uuid);

impl SeedId {
    /// Create a new random seed id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SeedId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a diary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    /// Create a new random entry id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable anonymous identifier for one browser identity.
///
/// This is the only key the remote leaderboard ever sees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserHash(pub String);

impl UserHash {
    /// Mint a fresh anonymous hash.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the raw hash string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted identity record; created once, never rotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Anonymous leaderboard key.
    pub user_hash: UserHash,
    /// When the identity was minted.
    pub created_at: Timestamp,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            user_hash: UserHash::generate(),
            created_at: Timestamp::EPOCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_since_is_fractional() {
        let a = Timestamp::from_millis(0);
        let b = Timestamp::from_millis(MS_PER_DAY * 3 / 2);
        assert!((b.days_since(a) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn days_since_saturates_at_extremes() {
        let far_past = Timestamp::from_millis(i64::MIN);
        let far_future = Timestamp::from_millis(i64::MAX);
        assert!(far_future.days_since(far_past) > 1e8);
        assert!(far_past.days_since(far_future) < -1e8);
    }

    #[test]
    fn minute_of_day_wraps_with_offset() {
        // 00:10 UTC shifted by -30 minutes is 23:40 the previous day.
        let t = Timestamp::from_millis(10 * MS_PER_MINUTE);
        assert_eq!(t.minute_of_day(0), 10);
        assert_eq!(t.minute_of_day(-30), 23 * 60 + 40);
    }

    #[test]
    fn hour_of_day_reads_utc() {
        let t = Timestamp::from_millis(5 * MS_PER_HOUR + 59 * MS_PER_MINUTE);
        assert_eq!(t.hour_of_day(0), 5);
        assert_eq!(t.hour_of_day(60), 6);
    }

    #[test]
    fn millis_since_never_negative() {
        let later = Timestamp::from_millis(1_000);
        let earlier = Timestamp::from_millis(400);
        assert_eq!(later.millis_since(earlier), 600);
        assert_eq!(earlier.millis_since(later), 0);
    }

    #[test]
    fn user_hash_is_stable_once_minted() {
        let h = UserHash::generate();
        let json = serde_json::to_string(&h).expect("ser");
        let back: UserHash = serde_json::from_str(&json).expect("de");
        assert_eq!(h, back);
        assert_eq!(h.as_str().len(), 32);
    }
}
