//! Seeds: planted phrases that grow with engagement and rot with neglect.
//!
//! Two monotone pressures compete on every evaluation:
//!
//! - **Neglect**: days since the seed was last nurtured. Past
//!   `decaying_after_days` the seed is forced to `Decaying`; past
//!   `dead_after_days` it is forced to `Dead`.
//! - **Engagement**: accumulated visits, which walk the seed through
//!   `Buried → Sprouting → Growing → Blooming`.
//!
//! Neglect is always applied first and always wins. `Dead` is terminal.
//! Stage changes only happen in [`SeedGarden::evaluate`]; nurturing a seed
//! updates its counters and nothing else, so stage-dependent reads must
//! evaluate first.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SeedConfig;
use crate::error::{Result, VeilError};
use crate::narrative;
use crate::store::Collection;
use crate::types::{SeedId, Timestamp};

/// Growth stage, ordered from freshly planted to gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeedStage {
    /// Planted, nothing visible yet.
    Buried,
    /// First sign of life.
    Sprouting,
    /// Clearly alive.
    Growing,
    /// Fully grown; carries a bloom message.
    Blooming,
    /// Neglected; can still be rescued by nurturing.
    Decaying,
    /// Gone for good.
    Dead,
}

impl SeedStage {
    /// Whether this stage belongs to the engagement-driven band.
    #[must_use]
    pub fn is_growth(self) -> bool {
        self <= Self::Blooming
    }
}

/// Emotional colour of a seed, inferred once at planting time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeedMood {
    /// Reaching toward something.
    Hopeful,
    /// Looking back at something lost.
    Melancholy,
    /// Asking.
    Curious,
    /// Something wrong underneath.
    Ominous,
    /// Nothing stood out.
    Neutral,
}

impl SeedMood {
    /// Classify a phrase by keyword.
    #[must_use]
    pub fn classify(phrase: &str) -> Self {
        const OMINOUS: [&str; 6] = ["dark", "blood", "dead", "die", "fear", "monster"];
        const MELANCHOLY: [&str; 5] = ["lost", "miss", "gone", "alone", "sorry"];
        const HOPEFUL: [&str; 5] = ["hope", "light", "home", "love", "dream"];

        let lower = phrase.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&OMINOUS) {
            Self::Ominous
        } else if has(&MELANCHOLY) {
            Self::Melancholy
        } else if has(&HOPEFUL) {
            Self::Hopeful
        } else if lower.trim_end().ends_with('?') {
            Self::Curious
        } else {
            Self::Neutral
        }
    }
}

/// One planted phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Unique identifier.
    pub id: SeedId,
    /// The planted phrase.
    pub phrase: String,
    /// Where or why it was planted.
    pub original_context: String,
    /// Planting time.
    pub planted_at: Timestamp,
    /// Last nurture (starts at `planted_at`).
    pub last_nurtured: Timestamp,
    /// Current stage, valid as of the last evaluation.
    pub stage: SeedStage,
    /// Emotional colour.
    pub mood: SeedMood,
    /// Planting plus every nurture.
    pub visits: u32,
    /// Whether the seed is shared beyond this visitor.
    pub is_global: bool,
    /// Written exactly once, on first entry into `Blooming`.
    #[serde(default)]
    pub bloom_message: Option<String>,
}

impl Seed {
    /// Plant a seed at `now` with one visit.
    #[must_use]
    pub fn new(
        phrase: impl Into<String>,
        original_context: impl Into<String>,
        is_global: bool,
        now: Timestamp,
    ) -> Self {
        let phrase = phrase.into();
        let mood = SeedMood::classify(&phrase);
        Self {
            id: SeedId::new(),
            phrase,
            original_context: original_context.into(),
            planted_at: now,
            last_nurtured: now,
            stage: SeedStage::Buried,
            mood,
            visits: 1,
            is_global,
            bloom_message: None,
        }
    }
}

/// A stage change observed during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedTransition {
    /// Which seed moved.
    pub id: SeedId,
    /// Stage before.
    pub from: SeedStage,
    /// Stage after.
    pub to: SeedStage,
}

/// Stage dictated by engagement alone.
#[must_use]
pub fn growth_stage(visits: u32, config: &SeedConfig) -> SeedStage {
    if visits >= config.blooming_visits {
        SeedStage::Blooming
    } else if visits >= config.growing_visits {
        SeedStage::Growing
    } else if visits >= config.sprouting_visits {
        SeedStage::Sprouting
    } else {
        SeedStage::Buried
    }
}

/// Next stage for a seed at `now`.
///
/// Decay is checked first and overrides growth. Within the growth band the
/// stage never moves down. A `Decaying` seed that has been nurtured again
/// re-enters the growth band at its engagement stage.
#[must_use]
pub fn next_stage(seed: &Seed, now: Timestamp, config: &SeedConfig) -> SeedStage {
    if seed.stage == SeedStage::Dead {
        return SeedStage::Dead;
    }

    let days = now.days_since(seed.last_nurtured);
    if days > config.dead_after_days {
        return SeedStage::Dead;
    }
    if days > config.decaying_after_days {
        return SeedStage::Decaying;
    }

    let grown = growth_stage(seed.visits, config);
    if seed.stage.is_growth() {
        grown.max(seed.stage)
    } else {
        grown
    }
}

/// All seeds planted by this visitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedGarden {
    seeds: Vec<Seed>,
}

impl Collection for SeedGarden {
    const KEY: &'static str = "veil.seeds";
}

impl SeedGarden {
    /// Empty garden.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plant a new seed and return its id.
    pub fn plant(
        &mut self,
        phrase: impl Into<String>,
        original_context: impl Into<String>,
        is_global: bool,
        now: Timestamp,
    ) -> SeedId {
        let seed = Seed::new(phrase, original_context, is_global, now);
        let id = seed.id;
        info!(seed = %id, mood = ?seed.mood, "Seed planted");
        self.seeds.push(seed);
        id
    }

    /// Record engagement with a seed. Does not change its stage.
    ///
    /// # Errors
    ///
    /// [`VeilError::NotFound`] if the seed does not exist.
    pub fn nurture(&mut self, id: SeedId, now: Timestamp) -> Result<&Seed> {
        let seed = self
            .seeds
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| VeilError::not_found("seed", id))?;
        seed.last_nurtured = now;
        seed.visits = seed.visits.saturating_add(1);
        debug!(seed = %id, visits = seed.visits, "Seed nurtured");
        Ok(seed)
    }

    /// Re-evaluate one seed's stage at `now`.
    ///
    /// # Errors
    ///
    /// [`VeilError::NotFound`] if the seed does not exist.
    pub fn evaluate(&mut self, id: SeedId, now: Timestamp, config: &SeedConfig) -> Result<SeedStage> {
        let seed = self
            .seeds
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| VeilError::not_found("seed", id))?;
        apply(seed, now, config);
        Ok(seed.stage)
    }

    /// Re-evaluate every seed; returns the stages that changed.
    pub fn evaluate_all(&mut self, now: Timestamp, config: &SeedConfig) -> Vec<SeedTransition> {
        self.seeds
            .iter_mut()
            .filter_map(|seed| {
                let from = seed.stage;
                apply(seed, now, config);
                (seed.stage != from).then_some(SeedTransition {
                    id: seed.id,
                    from,
                    to: seed.stage,
                })
            })
            .collect()
    }

    /// Look a seed up by id.
    #[must_use]
    pub fn get(&self, id: SeedId) -> Option<&Seed> {
        self.seeds.iter().find(|s| s.id == id)
    }

    /// All seeds, oldest first.
    #[must_use]
    pub fn list(&self) -> &[Seed] {
        &self.seeds
    }

    /// Seeds currently in bloom.
    pub fn blooming(&self) -> impl Iterator<Item = &Seed> {
        self.seeds.iter().filter(|s| s.stage == SeedStage::Blooming)
    }

    /// Number of seeds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// Whether nothing has been planted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

fn apply(seed: &mut Seed, now: Timestamp, config: &SeedConfig) {
    let next = next_stage(seed, now, config);
    if next == seed.stage {
        return;
    }
    if next == SeedStage::Blooming && seed.bloom_message.is_none() {
        seed.bloom_message = Some(narrative::bloom_message(&seed.phrase, seed.mood));
    }
    info!(seed = %seed.id, from = ?seed.stage, to = ?next, "Seed stage changed");
    seed.stage = next;
}
