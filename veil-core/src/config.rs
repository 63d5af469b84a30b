//! Configuration for the Veil narrative engine.
//!
//! Maps directly to `veil.toml`. Every field has a serde default so a
//! partial file (or an empty one) yields a working configuration.

use serde::{Deserialize, Serialize};

use crate::trust::TrustLevel;

/// Top-level Veil configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VeilConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Durable storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Trust score weights.
    #[serde(default)]
    pub trust: TrustWeights,
    /// Seed growth/decay thresholds.
    #[serde(default)]
    pub seeds: SeedConfig,
    /// Diary settings.
    #[serde(default)]
    pub diary: DiaryConfig,
    /// Narrative event scheduling.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Remote leaderboard sync.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl VeilConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `VeilError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::VeilError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Durable key-value store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Use WAL mode for the SQLite backend.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store and verify a CRC-32 of every blob.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Number of rotating backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
            backup_count: 3,
        }
    }
}

/// Weights for the trust score's counter-derived part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustWeights {
    /// Points per recorded visit.
    #[serde(default = "default_2_i64")]
    pub per_visit: i64,
    /// Points per console command flag that is set.
    #[serde(default = "default_15_i64")]
    pub per_console_flag: i64,
    /// Points per unlocked book code.
    #[serde(default = "default_25_i64")]
    pub per_book_code: i64,
    /// Points per discovered layered clue.
    #[serde(default = "default_20_i64")]
    pub per_clue: i64,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            per_visit: 2,
            per_console_flag: 15,
            per_book_code: 25,
            per_clue: 20,
        }
    }
}

/// Seed lifecycle thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Days without nurture after which a seed is forced to `Decaying`.
    #[serde(default = "default_14_f64")]
    pub decaying_after_days: f64,
    /// Days without nurture after which a seed is forced to `Dead`.
    #[serde(default = "default_30_f64")]
    pub dead_after_days: f64,
    /// Visits needed to reach `Sprouting`.
    #[serde(default = "default_2")]
    pub sprouting_visits: u32,
    /// Visits needed to reach `Growing`.
    #[serde(default = "default_3")]
    pub growing_visits: u32,
    /// Visits needed to reach `Blooming`.
    #[serde(default = "default_5")]
    pub blooming_visits: u32,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            decaying_after_days: 14.0,
            dead_after_days: 30.0,
            sprouting_visits: 2,
            growing_visits: 3,
            blooming_visits: 5,
        }
    }
}

/// Diary configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryConfig {
    /// Lifetime of an ephemeral entry in milliseconds.
    #[serde(default = "default_day_ms")]
    pub ephemeral_window_ms: i64,
}

impl Default for DiaryConfig {
    fn default() -> Self {
        Self {
            ephemeral_window_ms: 86_400_000,
        }
    }
}

/// How the firing chance of an event class is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityRule {
    /// Same chance regardless of context.
    Fixed(f64),
    /// Chance indexed by trust level: `[low, medium, high]`.
    TrustScaled([f64; 3]),
}

impl ProbabilityRule {
    /// Resolve the chance for the visitor's current trust level.
    #[must_use]
    pub fn chance(&self, level: TrustLevel) -> f64 {
        match self {
            Self::Fixed(p) => *p,
            Self::TrustScaled([low, medium, high]) => match level {
                TrustLevel::Low => *low,
                TrustLevel::Medium => *medium,
                TrustLevel::High => *high,
            },
        }
    }
}

/// Inclusive-start, exclusive-end minute-of-day window. Wraps past midnight
/// when `end_minute < start_minute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteWindow {
    /// First minute inside the window (0..1440).
    pub start_minute: u16,
    /// First minute after the window (0..1440).
    pub end_minute: u16,
}

impl MinuteWindow {
    /// Whether `minute` falls inside the window.
    #[must_use]
    pub fn contains(&self, minute: u16) -> bool {
        if self.start_minute <= self.end_minute {
            minute >= self.start_minute && minute < self.end_minute
        } else {
            minute >= self.start_minute || minute < self.end_minute
        }
    }
}

/// Gate parameters for one event class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassPolicy {
    /// How often the class is polled.
    pub poll_interval_secs: u64,
    /// Minimum time between two firings.
    pub cooldown_secs: u64,
    /// Firing chance per eligible poll.
    pub probability: ProbabilityRule,
    /// Optional wall-clock window the class is restricted to.
    #[serde(default)]
    pub window: Option<MinuteWindow>,
}

/// Narrative event scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Spontaneous chaos events.
    #[serde(default = "default_chaos_policy")]
    pub chaos: ClassPolicy,
    /// Whispers offered to an idle visitor.
    #[serde(default = "default_idle_policy")]
    pub idle_whisper: ClassPolicy,
    /// Commentary on day/night transitions.
    #[serde(default = "default_day_night_policy")]
    pub day_night: ClassPolicy,
    /// Periodic news commentary.
    #[serde(default = "default_news_policy")]
    pub news: ClassPolicy,
    /// Event only possible inside a narrow minute-of-day window.
    #[serde(default = "default_witching_policy")]
    pub witching: ClassPolicy,
    /// Idle time before idle whispers become eligible.
    #[serde(default = "default_60_u64")]
    pub idle_threshold_secs: u64,
    /// Offset applied to UTC for wall-clock windows and day phases.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Trust bonus awarded each time a chaos event fires.
    #[serde(default = "default_5_i64")]
    pub chaos_bonus: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            chaos: default_chaos_policy(),
            idle_whisper: default_idle_policy(),
            day_night: default_day_night_policy(),
            news: default_news_policy(),
            witching: default_witching_policy(),
            idle_threshold_secs: 60,
            utc_offset_minutes: 0,
            chaos_bonus: 5,
        }
    }
}

/// Remote leaderboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Provider: "http" or "none".
    #[serde(default = "default_none")]
    pub provider: String,
    /// Base URL of the REST endpoint.
    #[serde(default)]
    pub base_url: String,
    /// API key sent as `apikey` and bearer token.
    #[serde(default)]
    pub api_key: String,
    /// Table holding leaderboard rows.
    #[serde(default = "default_table")]
    pub table: String,
    /// Minimum seconds between two upserts.
    #[serde(default = "default_60_u64")]
    pub cooldown_secs: u64,
    /// Hard timeout for any remote call in milliseconds.
    #[serde(default = "default_5000")]
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            base_url: String::new(),
            api_key: String::new(),
            table: "leaderboard".to_string(),
            cooldown_secs: 60,
            request_timeout_ms: 5000,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_none() -> String { "none".to_string() }
fn default_table() -> String { "leaderboard".to_string() }
fn default_2() -> u32 { 2 }
fn default_3() -> u32 { 3 }
fn default_5() -> u32 { 5 }
fn default_2_i64() -> i64 { 2 }
fn default_5_i64() -> i64 { 5 }
fn default_15_i64() -> i64 { 15 }
fn default_20_i64() -> i64 { 20 }
fn default_25_i64() -> i64 { 25 }
fn default_14_f64() -> f64 { 14.0 }
fn default_30_f64() -> f64 { 30.0 }
fn default_60_u64() -> u64 { 60 }
fn default_5000() -> u64 { 5000 }
fn default_day_ms() -> i64 { 86_400_000 }

fn default_chaos_policy() -> ClassPolicy {
    ClassPolicy {
        poll_interval_secs: 60,
        cooldown_secs: 600,
        probability: ProbabilityRule::Fixed(0.05),
        window: None,
    }
}

fn default_idle_policy() -> ClassPolicy {
    ClassPolicy {
        poll_interval_secs: 30,
        cooldown_secs: 120,
        probability: ProbabilityRule::Fixed(0.3),
        window: None,
    }
}

fn default_day_night_policy() -> ClassPolicy {
    ClassPolicy {
        poll_interval_secs: 300,
        cooldown_secs: 1800,
        probability: ProbabilityRule::TrustScaled([0.2, 0.4, 0.7]),
        window: None,
    }
}

fn default_news_policy() -> ClassPolicy {
    ClassPolicy {
        poll_interval_secs: 600,
        cooldown_secs: 3600,
        probability: ProbabilityRule::Fixed(0.15),
        window: None,
    }
}

fn default_witching_policy() -> ClassPolicy {
    ClassPolicy {
        poll_interval_secs: 60,
        cooldown_secs: 86_400,
        probability: ProbabilityRule::Fixed(0.5),
        window: Some(MinuteWindow {
            start_minute: 3 * 60 + 33,
            end_minute: 3 * 60 + 34,
        }),
    }
}
