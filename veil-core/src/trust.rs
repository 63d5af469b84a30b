//! Trust score and rank ladder.
//!
//! The score is *accumulated*: most of it is a weighted sum over counters
//! in [`UserState`], and the rest is one-off narrative bonuses persisted in
//! `trust.bonus_points` at the moment they were earned. Both parts live in
//! persisted state, so [`score`] is a pure function of what was saved.
//!
//! Rank thresholds (inclusive lower bound, highest match wins):
//!
//! | Score   | Rank        |
//! |---------|-------------|
//! | ≥ 800   | Monster     |
//! | ≥ 500   | Gatekeeper  |
//! | ≥ 300   | Survivor    |
//! | ≥ 100   | Watcher     |
//! | else    | Drifter     |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::TrustWeights;
use crate::state::UserState;

/// Coarse trust level used to scale narrative probabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Score below 100.
    #[default]
    Low,
    /// Score in 100..300.
    Medium,
    /// Score 300 and above.
    High,
}

impl TrustLevel {
    /// Classify a score into a level.
    #[must_use]
    pub fn from_score(score: i64) -> Self {
        match score {
            s if s >= 300 => Self::High,
            s if s >= 100 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Rank ladder, ordered `Drifter < Watcher < Survivor < Gatekeeper < Monster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    /// Score below 100.
    Drifter,
    /// Score 100 and above.
    Watcher,
    /// Score 300 and above.
    Survivor,
    /// Score 500 and above.
    Gatekeeper,
    /// Score 800 and above.
    Monster,
}

/// Thresholds evaluated highest-first.
const RANK_TABLE: [(i64, Rank); 4] = [
    (800, Rank::Monster),
    (500, Rank::Gatekeeper),
    (300, Rank::Survivor),
    (100, Rank::Watcher),
];

impl Rank {
    /// Map a score onto the ladder. Boundary scores take the higher rank.
    #[must_use]
    pub fn from_score(score: i64) -> Self {
        RANK_TABLE
            .iter()
            .find(|(threshold, _)| score >= *threshold)
            .map_or(Self::Drifter, |(_, rank)| *rank)
    }

    /// Display label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Drifter => "Drifter",
            Self::Watcher => "Watcher",
            Self::Survivor => "Survivor",
            Self::Gatekeeper => "Gatekeeper",
            Self::Monster => "Monster",
        }
    }

    /// Minimum score of this rank.
    #[must_use]
    pub fn threshold(self) -> i64 {
        RANK_TABLE
            .iter()
            .find(|(_, rank)| *rank == self)
            .map_or(0, |(t, _)| *t)
    }

    /// Points still missing to reach the next rank, `None` at the top.
    #[must_use]
    pub fn points_to_next(score: i64) -> Option<i64> {
        RANK_TABLE
            .iter()
            .rev()
            .find(|(threshold, _)| score < *threshold)
            .map(|(threshold, _)| threshold - score)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Compute the visitor's trust score from persisted state.
#[must_use]
pub fn score(state: &UserState, weights: &TrustWeights) -> i64 {
    let visits = i64::try_from(state.visit_count()).unwrap_or(i64::MAX);
    let flags = count(state.console_flag_count());
    let codes = count(state.book_codes().len());
    let clues = count(state.layered_clues().len());

    visits
        .saturating_mul(weights.per_visit)
        .saturating_add(flags.saturating_mul(weights.per_console_flag))
        .saturating_add(codes.saturating_mul(weights.per_book_code))
        .saturating_add(clues.saturating_mul(weights.per_clue))
        .saturating_add(state.trust.bonus_points)
}

/// Rank for a score.
#[must_use]
pub fn rank(score: i64) -> Rank {
    Rank::from_score(score)
}

/// Recompute and store `trust.score` / `trust.level`. Returns the new score.
pub fn refresh_trust(state: &mut UserState, weights: &TrustWeights) -> i64 {
    let s = score(state, weights);
    state.trust.score = s;
    state.trust.level = TrustLevel::from_score(s);
    s
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    #[test]
    fn rank_boundaries_take_higher_rank() {
        assert_eq!(rank(99), Rank::Drifter);
        assert_eq!(rank(100), Rank::Watcher);
        assert_eq!(rank(299), Rank::Watcher);
        assert_eq!(rank(300), Rank::Survivor);
        assert_eq!(rank(499), Rank::Survivor);
        assert_eq!(rank(500), Rank::Gatekeeper);
        assert_eq!(rank(799), Rank::Gatekeeper);
        assert_eq!(rank(800), Rank::Monster);
        assert_eq!(rank(-5), Rank::Drifter);
    }

    #[test]
    fn gatekeeper_boundary_labels() {
        assert_eq!(rank(500).label(), "Gatekeeper");
        assert_eq!(rank(499).label(), "Survivor");
    }

    #[test]
    fn rank_order_is_total() {
        assert!(Rank::Drifter < Rank::Watcher);
        assert!(Rank::Watcher < Rank::Survivor);
        assert!(Rank::Survivor < Rank::Gatekeeper);
        assert!(Rank::Gatekeeper < Rank::Monster);
    }

    #[test]
    fn points_to_next_rank() {
        assert_eq!(Rank::points_to_next(0), Some(100));
        assert_eq!(Rank::points_to_next(450), Some(50));
        assert_eq!(Rank::points_to_next(800), None);
        assert_eq!(Rank::Gatekeeper.threshold(), 500);
        assert_eq!(Rank::Drifter.threshold(), 0);
    }

    #[test]
    fn score_is_weighted_sum_plus_bonus() {
        let weights = TrustWeights::default();
        let mut state = UserState::new();
        state.begin_visit(Timestamp::from_millis(1));
        state.begin_visit(Timestamp::from_millis(2));
        state.set_console_flag("help");
        state.unlock_book_code("alpha");
        state.discover_clue("mirror");
        state.award_bonus("chaos", 7);

        let expected = 2 * weights.per_visit
            + weights.per_console_flag
            + weights.per_book_code
            + weights.per_clue
            + 7;
        assert_eq!(score(&state, &weights), expected);
    }

    #[test]
    fn refresh_trust_persists_score_and_level() {
        let weights = TrustWeights {
            per_book_code: 100,
            ..TrustWeights::default()
        };
        let mut state = UserState::new();
        state.unlock_book_code("a");
        state.unlock_book_code("b");
        state.unlock_book_code("c");
        let s = refresh_trust(&mut state, &weights);
        assert_eq!(s, 300);
        assert_eq!(state.trust.score, 300);
        assert_eq!(state.trust.level, TrustLevel::High);
    }
}
