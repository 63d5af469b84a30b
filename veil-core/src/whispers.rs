//! Whispers: static fragments that are either found or not.
//!
//! Discovery is one-way: once a whisper is discovered its record is frozen
//! and later matches are reported as [`DiscoverOutcome::AlreadyDiscovered`].

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::RandomSource;
use crate::narrative;
use crate::store::Collection;
use crate::types::Timestamp;

/// How a whisper is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhisperKind {
    /// Hidden in page text.
    Text,
    /// Printed by the console.
    Console,
    /// Shown as an image or effect.
    Visual,
    /// Played as sound.
    Audio,
}

/// One discoverable fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Whisper {
    /// Stable catalog id.
    pub id: String,
    /// The fragment itself.
    pub content: String,
    /// Delivery channel.
    #[serde(rename = "type")]
    pub kind: WhisperKind,
    /// 0..=10.
    pub importance: u8,
    /// Found yet?
    #[serde(default)]
    pub discovered: bool,
    /// When it was found.
    #[serde(default)]
    pub discovery_time: Option<Timestamp>,
}

impl Whisper {
    /// Undiscovered whisper; importance is clamped to 10.
    #[must_use]
    pub fn new(id: &str, content: &str, kind: WhisperKind, importance: u8) -> Self {
        Self {
            id: id.to_string(),
            content: content.to_string(),
            kind,
            importance: importance.min(10),
            discovered: false,
            discovery_time: None,
        }
    }

    fn matches(&self, matcher: &str) -> bool {
        !matcher.is_empty() && (self.id == matcher || self.content.contains(matcher))
    }
}

/// Result of a discovery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverOutcome {
    /// A whisper was found for the first time.
    Discovered(Whisper),
    /// The matcher only hits whispers that were already found.
    AlreadyDiscovered(String),
    /// Nothing matches.
    NoMatch,
}

/// Every whisper known to this visitor, with discovery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhisperBook {
    whispers: Vec<Whisper>,
}

impl Collection for WhisperBook {
    const KEY: &'static str = "veil.whispers";
}

impl Default for WhisperBook {
    fn default() -> Self {
        Self::with_catalog(default_catalog())
    }
}

fn default_catalog() -> Vec<Whisper> {
    vec![
        Whisper::new("w-gate", "the gate remembers every name", WhisperKind::Text, 3),
        Whisper::new("w-fire", "do not let the fire go out", WhisperKind::Text, 5),
        Whisper::new("w-help", "help was never coming", WhisperKind::Console, 6),
        Whisper::new("w-mirror", "it smiles a moment too late", WhisperKind::Visual, 7),
        Whisper::new("w-static", "the static says your name", WhisperKind::Audio, 8),
        Whisper::new("w-ledger", "the ledger lists one more survivor than lived", WhisperKind::Text, 9),
        Whisper::new("w-root", "we were here before the page", WhisperKind::Console, 10),
    ]
}

impl WhisperBook {
    /// Book over an explicit catalog.
    #[must_use]
    pub fn with_catalog(whispers: Vec<Whisper>) -> Self {
        Self { whispers }
    }

    /// Discover the first undiscovered whisper matching `matcher` (exact id
    /// or substring of content).
    pub fn discover(&mut self, matcher: &str, now: Timestamp) -> DiscoverOutcome {
        if let Some(w) = self
            .whispers
            .iter_mut()
            .find(|w| !w.discovered && w.matches(matcher))
        {
            w.discovered = true;
            w.discovery_time = Some(now);
            info!(whisper = %w.id, "Whisper discovered");
            return DiscoverOutcome::Discovered(w.clone());
        }

        self.whispers
            .iter()
            .find(|w| w.matches(matcher))
            .map_or(DiscoverOutcome::NoMatch, |w| {
                DiscoverOutcome::AlreadyDiscovered(w.id.clone())
            })
    }

    /// Hint for a uniformly chosen undiscovered whisper.
    pub fn hint(&self, rng: &mut dyn RandomSource) -> &'static str {
        let remaining: Vec<&Whisper> = self.whispers.iter().filter(|w| !w.discovered).collect();
        if remaining.is_empty() {
            return narrative::ALL_WHISPERS_FOUND;
        }
        narrative::whisper_hint(remaining[rng.pick_index(remaining.len())].kind)
    }

    /// Number of discovered whispers.
    #[must_use]
    pub fn discovered_count(&self) -> usize {
        self.whispers.iter().filter(|w| w.discovered).count()
    }

    /// Number still hidden.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.whispers.len() - self.discovered_count()
    }

    /// All whispers.
    #[must_use]
    pub fn list(&self) -> &[Whisper] {
        &self.whispers
    }
}
