//! Clock and randomness seams.
//!
//! The narrative engine never reads ambient time or ambient randomness
//! directly; both come in through these traits so scheduling decisions can
//! be replayed in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, VeilError};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Read the current time.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Clock`] if the time source is unavailable.
    fn now(&self) -> Result<Timestamp>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Timestamp> {
        Ok(Timestamp::now())
    }
}

/// A hand-driven clock for tests and replays.
///
/// Can be switched into a failing mode to exercise the no-fire path.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
    broken: AtomicBool,
}

impl ManualClock {
    /// Start the clock at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_ms: AtomicI64::new(start.as_millis()),
            broken: AtomicBool::new(false),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, t: Timestamp) {
        self.now_ms.store(t.as_millis(), Ordering::SeqCst);
    }

    /// Move forward by `ms` milliseconds.
    pub fn advance(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Make subsequent reads fail (or recover).
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Timestamp> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(VeilError::Clock("manual clock marked broken".into()));
        }
        Ok(Timestamp::from_millis(self.now_ms.load(Ordering::SeqCst)))
    }
}

// ---------------------------------------------------------------------------
// Randomness
// ---------------------------------------------------------------------------

/// Uniform random source used for probability rolls and picks.
pub trait RandomSource: Send {
    /// Uniform value in `[0, 1)`.
    fn next_unit(&mut self) -> f64;

    /// Uniform index in `0..len`. `len` must be non-zero.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn pick_index(&mut self, len: usize) -> usize {
        let idx = (self.next_unit() * len as f64) as usize;
        idx.min(len.saturating_sub(1))
    }
}

/// Production random source backed by a seeded [`StdRng`].
#[derive(Debug)]
pub struct ThreadRandom {
    rng: StdRng,
}

impl ThreadRandom {
    /// Seed from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic stream for reproducible runs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for ThreadRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for ThreadRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }

    fn pick_index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

/// Replays a fixed list of unit values, then repeats `fallback` forever.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    queue: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedRandom {
    /// Script the given rolls; once exhausted every roll returns `fallback`.
    #[must_use]
    pub fn new(rolls: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            queue: rolls.into_iter().collect(),
            fallback,
        }
    }

    /// Every roll returns `value`.
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self::new([], value)
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self) -> f64 {
        self.queue.pop_front().unwrap_or(self.fallback)
    }
}
