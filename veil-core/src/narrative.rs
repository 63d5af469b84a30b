//! Narrative text tables.
//!
//! Every table is keyed by a closed enum with an explicit fallback arm, so
//! a page or phase nobody wrote copy for still gets a line instead of a
//! missing-key lookup at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::RandomSource;
use crate::seeds::SeedMood;
use crate::trust::TrustLevel;
use crate::whispers::WhisperKind;

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Pages that carry their own narrative copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    /// Landing page.
    Gate,
    /// Campfire stories.
    Campfire,
    /// Document archive.
    Archive,
    /// Mirror page.
    Mirror,
    /// Visitor diary.
    Journal,
    /// Leaderboard.
    Survivors,
    /// Anything else.
    Other,
}

impl Page {
    /// Classify a route or page slug.
    #[must_use]
    pub fn parse(slug: &str) -> Self {
        match slug.trim_matches('/').to_ascii_lowercase().as_str() {
            "" | "gate" | "index" => Self::Gate,
            "campfire" => Self::Campfire,
            "archive" | "archives" => Self::Archive,
            "mirror" => Self::Mirror,
            "journal" | "diary" => Self::Journal,
            "survivors" | "leaderboard" => Self::Survivors,
            _ => Self::Other,
        }
    }

    /// Lines whispered when the visitor goes idle on this page.
    #[must_use]
    pub fn idle_lines(self) -> &'static [&'static str] {
        match self {
            Self::Gate => &[
                "The gate is still open. You could leave.",
                "Someone else stood here yesterday. They left too soon.",
            ],
            Self::Campfire => &[
                "The fire burns lower when nobody speaks.",
                "Sit closer. The stories are quieter tonight.",
            ],
            Self::Archive => &[
                "Not every page in here was written by a person.",
                "One of these files changed while you were reading it.",
            ],
            Self::Mirror => &[
                "It blinked after you did.",
                "Keep looking. It is almost ready to answer.",
            ],
            Self::Journal => &["Write it down before it rewrites itself."],
            Self::Survivors => &["Every name on this list was once a drifter."],
            Self::Other => &["Still here?", "The quiet is listening."],
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gate => "gate",
            Self::Campfire => "campfire",
            Self::Archive => "archive",
            Self::Mirror => "mirror",
            Self::Journal => "journal",
            Self::Survivors => "survivors",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Day phases
// ---------------------------------------------------------------------------

/// Coarse part of the visitor's local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPhase {
    /// 05:00 to 08:00.
    Dawn,
    /// 08:00 to 18:00.
    Day,
    /// 18:00 to 21:00.
    Dusk,
    /// 21:00 to 05:00.
    Night,
}

impl DayPhase {
    /// Phase for an hour of the day (0..24).
    #[must_use]
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            5..=7 => Self::Dawn,
            8..=17 => Self::Day,
            18..=20 => Self::Dusk,
            _ => Self::Night,
        }
    }

    /// Commentary on entering this phase, darker as trust grows.
    #[must_use]
    pub fn comment(self, trust: TrustLevel) -> &'static str {
        match (self, trust) {
            (Self::Dawn, TrustLevel::High) => "You made it through another night. Not everyone did.",
            (Self::Dawn, _) => "Morning. The shadows are shorter now.",
            (Self::Day, TrustLevel::High) => "Daylight only hides them. It does not make them leave.",
            (Self::Day, _) => "It is bright out. Nothing to worry about.",
            (Self::Dusk, TrustLevel::Low) => "The light is going. You should head home.",
            (Self::Dusk, _) => "Dusk again. You know what comes next.",
            (Self::Night, TrustLevel::Low) => "It is late. Are you sure you want to be here?",
            (Self::Night, TrustLevel::Medium) => "Night. The pages read differently now.",
            (Self::Night, TrustLevel::High) => "Welcome back to the dark. We kept your seat warm.",
        }
    }
}

// ---------------------------------------------------------------------------
// Chaos
// ---------------------------------------------------------------------------

/// Kinds of transient chaos effect a renderer can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaosKind {
    /// Visual glitch over the page.
    Glitch,
    /// Lights flicker.
    Flicker,
    /// Static burst with audio.
    StaticBurst,
    /// A past whisper is replayed.
    Echo,
    /// Console output bleeds into the page.
    ConsoleBleed,
}

impl ChaosKind {
    /// Every chaos kind, in selection order.
    pub const ALL: [Self; 5] = [
        Self::Glitch,
        Self::Flicker,
        Self::StaticBurst,
        Self::Echo,
        Self::ConsoleBleed,
    ];

    /// Pick one kind uniformly.
    pub fn pick(rng: &mut dyn RandomSource) -> Self {
        Self::ALL[rng.pick_index(Self::ALL.len())]
    }

    /// Stable snake-case key, used in event counters.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Glitch => "glitch",
            Self::Flicker => "flicker",
            Self::StaticBurst => "static_burst",
            Self::Echo => "echo",
            Self::ConsoleBleed => "console_bleed",
        }
    }

    /// Text shown alongside the effect.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Glitch => "Something slipped. Did you see it?",
            Self::Flicker => "The lights are not supposed to do that.",
            Self::StaticBurst => "...can you hear me through the static...",
            Self::Echo => "You have heard this before.",
            Self::ConsoleBleed => "> they are reading over your shoulder",
        }
    }
}

// ---------------------------------------------------------------------------
// Periodic lines
// ---------------------------------------------------------------------------

/// News-ticker lines.
pub const NEWS_LINES: &[&str] = &[
    "Local woman reports hearing her name from an empty campsite.",
    "Search for missing hiker called off after third sighting of the lantern.",
    "Archivist insists the ledger had fewer pages last week.",
    "Residents advised not to answer knocking after midnight.",
];

/// The witching-minute line.
pub const WITCHING_LINE: &str = "3:33. It is awake.";

/// Pick a news line.
pub fn news_line(rng: &mut dyn RandomSource) -> &'static str {
    NEWS_LINES[rng.pick_index(NEWS_LINES.len())]
}

// ---------------------------------------------------------------------------
// Seeds and whispers
// ---------------------------------------------------------------------------

/// Message written once when a seed first blooms.
#[must_use]
pub fn bloom_message(phrase: &str, mood: SeedMood) -> String {
    match mood {
        SeedMood::Hopeful => format!("\"{phrase}\" grew toward the light. Someone else found it."),
        SeedMood::Melancholy => format!("\"{phrase}\" bloomed quietly, the way grief does."),
        SeedMood::Curious => format!("\"{phrase}\" bloomed into a question nobody can answer."),
        SeedMood::Ominous => format!("\"{phrase}\" bloomed. It should not have."),
        SeedMood::Neutral => format!("\"{phrase}\" has bloomed."),
    }
}

/// Hint pointing at an undiscovered whisper of the given kind.
#[must_use]
pub fn whisper_hint(kind: WhisperKind) -> &'static str {
    match kind {
        WhisperKind::Text => "Some words are hiding in plain sight. Read slower.",
        WhisperKind::Console => "The console knows more than it prints. Ask it.",
        WhisperKind::Visual => "Look where the page flickers.",
        WhisperKind::Audio => "Turn the sound up. Something is underneath.",
    }
}

/// Shown when every whisper has been found.
pub const ALL_WHISPERS_FOUND: &str = "You have heard every whisper. Now they listen to you.";
