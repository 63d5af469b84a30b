//! Probabilistic Event Scheduler.
//!
//! Every narrative event class shares one gate. On each poll a class must
//! pass, in order:
//!
//! 1. **Cooldown**: at least `max(cooldown, poll_interval)` since it last fired.
//! 2. **Window**: the local minute-of-day lies in the class window, if any.
//! 3. **Eligibility**: class-specific preconditions (idle time, phase change).
//! 4. **Roll**: a uniform draw below the class chance.
//!
//! A class that passes fires exactly one [`NarrativeEvent`] and stamps its
//! cooldown. Because the effective cooldown is never shorter than the poll
//! interval, a class fires at most once per interval.
//!
//! The scheduler itself is pure: state lives in [`SchedulerState`], time and
//! randomness are passed in. Driving it on timers is the host's job.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{Clock, RandomSource};
use crate::config::{ClassPolicy, SchedulerConfig};
use crate::error::Result;
use crate::narrative::{self, ChaosKind, DayPhase, Page};
use crate::store::Collection;
use crate::trust::TrustLevel;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Classes and events
// ---------------------------------------------------------------------------

/// Independently gated kinds of narrative event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    /// Spontaneous glitch with a trust bonus.
    Chaos,
    /// Line whispered after the visitor goes idle.
    IdleWhisper,
    /// Commentary when the local day phase changes.
    DayNight,
    /// Periodic news ticker line.
    News,
    /// Only inside the witching-minute window.
    Witching,
}

impl EventClass {
    /// Every class, in polling order.
    pub const ALL: [Self; 5] = [
        Self::Chaos,
        Self::IdleWhisper,
        Self::DayNight,
        Self::News,
        Self::Witching,
    ];

    /// Gate parameters for this class.
    #[must_use]
    pub fn policy(self, config: &SchedulerConfig) -> &ClassPolicy {
        match self {
            Self::Chaos => &config.chaos,
            Self::IdleWhisper => &config.idle_whisper,
            Self::DayNight => &config.day_night,
            Self::News => &config.news,
            Self::Witching => &config.witching,
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Chaos => "chaos",
            Self::IdleWhisper => "idle_whisper",
            Self::DayNight => "day_night",
            Self::News => "news",
            Self::Witching => "witching",
        };
        f.write_str(s)
    }
}

/// What a fired event carries to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NarrativePayload {
    /// A chaos effect.
    Chaos {
        /// Effect to play.
        kind: ChaosKind,
        /// Accompanying text.
        message: String,
    },
    /// An idle whisper.
    IdleWhisper {
        /// Page the visitor idled on.
        page: Page,
        /// The whispered line.
        line: String,
    },
    /// Day-phase commentary.
    DayNight {
        /// Phase just entered.
        phase: DayPhase,
        /// The comment.
        comment: String,
    },
    /// A news ticker line.
    News {
        /// The headline.
        line: String,
    },
    /// The witching-minute line.
    Witching {
        /// The line.
        line: String,
    },
}

/// One fired narrative event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeEvent {
    /// Which class fired.
    pub class: EventClass,
    /// When it fired.
    pub fired_at: Timestamp,
    /// Renderer payload.
    pub payload: NarrativePayload,
}

impl NarrativeEvent {
    /// Display text for a toast or console line.
    #[must_use]
    pub fn message(&self) -> &str {
        match &self.payload {
            NarrativePayload::Chaos { message, .. } => message,
            NarrativePayload::IdleWhisper { line, .. }
            | NarrativePayload::News { line }
            | NarrativePayload::Witching { line } => line,
            NarrativePayload::DayNight { comment, .. } => comment,
        }
    }
}

/// Why a poll did or did not fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The class fired.
    Fired(NarrativeEvent),
    /// Still inside the cooldown.
    CoolingDown,
    /// Outside the class's minute-of-day window.
    OutsideWindow,
    /// A class-specific precondition failed.
    NotEligible,
    /// The probability roll missed.
    RollMissed,
    /// The clock could not be read.
    ClockUnavailable,
}

impl TickOutcome {
    /// The fired event, if any.
    #[must_use]
    pub fn into_event(self) -> Option<NarrativeEvent> {
        match self {
            Self::Fired(event) => Some(event),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// State and inputs
// ---------------------------------------------------------------------------

/// Persisted per-class cooldown stamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerState {
    #[serde(default)]
    last_fired: BTreeMap<EventClass, Timestamp>,
    #[serde(default)]
    last_phase: Option<DayPhase>,
}

impl Collection for SchedulerState {
    const KEY: &'static str = "veil.scheduler";
}

impl SchedulerState {
    /// When `class` last fired.
    #[must_use]
    pub fn last_fired(&self, class: EventClass) -> Option<Timestamp> {
        self.last_fired.get(&class).copied()
    }

    /// Day phase last announced.
    #[must_use]
    pub fn last_phase(&self) -> Option<DayPhase> {
        self.last_phase
    }
}

/// Visitor context sampled at poll time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signals {
    /// Current trust level.
    pub trust: TrustLevel,
    /// Milliseconds since the last user action.
    pub idle_ms: i64,
    /// Page the visitor is on.
    pub page: Page,
}

impl Default for Signals {
    fn default() -> Self {
        Self {
            trust: TrustLevel::Low,
            idle_ms: 0,
            page: Page::Gate,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Gate logic for every event class.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    /// Scheduler over the given policies.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Cooldown actually enforced for `class`, in milliseconds.
    #[must_use]
    pub fn effective_cooldown_ms(&self, class: EventClass) -> i64 {
        let policy = class.policy(&self.config);
        let secs = policy.cooldown_secs.max(policy.poll_interval_secs);
        i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    /// Read the clock and poll `class`. A clock failure is a no-fire.
    pub fn poll(
        &self,
        class: EventClass,
        state: &mut SchedulerState,
        clock: &dyn Clock,
        signals: &Signals,
        rng: &mut dyn RandomSource,
    ) -> TickOutcome {
        match clock.now() {
            Ok(now) => self.tick(class, state, now, signals, rng),
            Err(e) => {
                debug!(%class, error = %e, "Clock unavailable; skipping tick");
                TickOutcome::ClockUnavailable
            }
        }
    }

    /// Run every gate for `class` at `now`.
    pub fn tick(
        &self,
        class: EventClass,
        state: &mut SchedulerState,
        now: Timestamp,
        signals: &Signals,
        rng: &mut dyn RandomSource,
    ) -> TickOutcome {
        let policy = class.policy(&self.config);

        if let Some(last) = state.last_fired(class) {
            if now.millis_since(last) < self.effective_cooldown_ms(class) {
                return TickOutcome::CoolingDown;
            }
        }

        if let Some(window) = policy.window {
            if !window.contains(now.minute_of_day(self.config.utc_offset_minutes)) {
                return TickOutcome::OutsideWindow;
            }
        }

        let phase = DayPhase::from_hour(now.hour_of_day(self.config.utc_offset_minutes));
        let eligible = match class {
            EventClass::IdleWhisper => {
                let threshold = i64::try_from(self.config.idle_threshold_secs.saturating_mul(1000))
                    .unwrap_or(i64::MAX);
                signals.idle_ms >= threshold
            }
            EventClass::DayNight => state.last_phase != Some(phase),
            EventClass::Chaos | EventClass::News | EventClass::Witching => true,
        };
        if !eligible {
            return TickOutcome::NotEligible;
        }

        let chance = policy.probability.chance(signals.trust);
        let roll = rng.next_unit();
        if roll >= chance {
            debug!(%class, roll, chance, "Roll missed");
            return TickOutcome::RollMissed;
        }

        let payload = match class {
            EventClass::Chaos => {
                let kind = ChaosKind::pick(rng);
                NarrativePayload::Chaos {
                    kind,
                    message: kind.message().to_string(),
                }
            }
            EventClass::IdleWhisper => {
                let lines = signals.page.idle_lines();
                NarrativePayload::IdleWhisper {
                    page: signals.page,
                    line: lines[rng.pick_index(lines.len())].to_string(),
                }
            }
            EventClass::DayNight => {
                state.last_phase = Some(phase);
                NarrativePayload::DayNight {
                    phase,
                    comment: phase.comment(signals.trust).to_string(),
                }
            }
            EventClass::News => NarrativePayload::News {
                line: narrative::news_line(rng).to_string(),
            },
            EventClass::Witching => NarrativePayload::Witching {
                line: narrative::WITCHING_LINE.to_string(),
            },
        };

        state.last_fired.insert(class, now);
        info!(%class, "Narrative event fired");
        TickOutcome::Fired(NarrativeEvent {
            class,
            fired_at: now,
            payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Downstream listener for fired events (toast queue, console, audio cue).
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Implementation-defined; callers log and move on.
    fn deliver(&self, event: &NarrativeEvent) -> Result<()>;
}

/// Buffers events until a renderer drains them.
#[derive(Debug, Default)]
pub struct QueueSink {
    queue: Mutex<Vec<NarrativeEvent>>,
}

impl QueueSink {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&self) -> Vec<NarrativeEvent> {
        std::mem::take(&mut *self.queue.lock())
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl EventSink for QueueSink {
    fn deliver(&self, event: &NarrativeEvent) -> Result<()> {
        self.queue.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, ScriptedRandom};
    use crate::config::{MinuteWindow, ProbabilityRule};
    use crate::types::{MS_PER_HOUR, MS_PER_MINUTE};

    fn t(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn always() -> ScriptedRandom {
        ScriptedRandom::constant(0.0)
    }

    #[test]
    fn fires_then_cools_down() {
        let sched = Scheduler::default();
        let mut state = SchedulerState::default();
        let signals = Signals::default();

        let first = sched.tick(EventClass::Chaos, &mut state, t(0), &signals, &mut always());
        assert!(matches!(first, TickOutcome::Fired(_)));
        assert_eq!(state.last_fired(EventClass::Chaos), Some(t(0)));

        let cd = sched.effective_cooldown_ms(EventClass::Chaos);
        let again = sched.tick(EventClass::Chaos, &mut state, t(cd - 1), &signals, &mut always());
        assert_eq!(again, TickOutcome::CoolingDown);
        let later = sched.tick(EventClass::Chaos, &mut state, t(cd), &signals, &mut always());
        assert!(matches!(later, TickOutcome::Fired(_)));
    }

    #[test]
    fn roll_at_threshold_misses() {
        let mut config = SchedulerConfig::default();
        config.news.probability = ProbabilityRule::Fixed(0.5);
        let sched = Scheduler::new(config);
        let mut state = SchedulerState::default();
        let mut rng = ScriptedRandom::new([0.5, 0.49], 0.0);

        let miss = sched.tick(EventClass::News, &mut state, t(0), &Signals::default(), &mut rng);
        assert_eq!(miss, TickOutcome::RollMissed);
        assert!(state.last_fired(EventClass::News).is_none());
        let hit = sched.tick(EventClass::News, &mut state, t(0), &Signals::default(), &mut rng);
        assert!(matches!(hit, TickOutcome::Fired(_)));
    }

    #[test]
    fn day_night_chance_scales_with_trust() {
        let sched = Scheduler::default();
        let mut rng = ScriptedRandom::constant(0.5);
        let low = Signals::default();
        let high = Signals {
            trust: TrustLevel::High,
            ..Signals::default()
        };

        let mut state = SchedulerState::default();
        assert_eq!(
            sched.tick(EventClass::DayNight, &mut state, t(0), &low, &mut rng),
            TickOutcome::RollMissed
        );
        assert!(matches!(
            sched.tick(EventClass::DayNight, &mut state, t(0), &high, &mut rng),
            TickOutcome::Fired(_)
        ));
    }

    #[test]
    fn day_night_needs_phase_change() {
        let sched = Scheduler::default();
        let mut state = SchedulerState::default();
        let signals = Signals::default();
        // 22:00 UTC, Night.
        let night = t(22 * MS_PER_HOUR);
        assert!(matches!(
            sched.tick(EventClass::DayNight, &mut state, night, &signals, &mut always()),
            TickOutcome::Fired(_)
        ));
        assert_eq!(state.last_phase(), Some(DayPhase::Night));

        // Two hours later: cooldown passed, still Night.
        let still_night = night.plus_millis(2 * MS_PER_HOUR);
        assert_eq!(
            sched.tick(EventClass::DayNight, &mut state, still_night, &signals, &mut always()),
            TickOutcome::NotEligible
        );

        // Next morning.
        let dawn = t(24 * MS_PER_HOUR + 6 * MS_PER_HOUR);
        assert!(matches!(
            sched.tick(EventClass::DayNight, &mut state, dawn, &signals, &mut always()),
            TickOutcome::Fired(_)
        ));
    }

    #[test]
    fn idle_whisper_requires_idle_threshold() {
        let sched = Scheduler::default();
        let mut state = SchedulerState::default();
        let busy = Signals {
            idle_ms: 1_000,
            page: Page::Mirror,
            ..Signals::default()
        };
        assert_eq!(
            sched.tick(EventClass::IdleWhisper, &mut state, t(0), &busy, &mut always()),
            TickOutcome::NotEligible
        );

        let idle = Signals {
            idle_ms: 120_000,
            ..busy
        };
        match sched.tick(EventClass::IdleWhisper, &mut state, t(0), &idle, &mut always()) {
            TickOutcome::Fired(event) => {
                assert!(Page::Mirror.idle_lines().contains(&event.message()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn witching_only_inside_window() {
        let mut config = SchedulerConfig::default();
        config.witching.window = Some(MinuteWindow {
            start_minute: 213,
            end_minute: 214,
        });
        let sched = Scheduler::new(config);
        let mut state = SchedulerState::default();
        let signals = Signals::default();

        let outside = t(212 * MS_PER_MINUTE);
        assert_eq!(
            sched.tick(EventClass::Witching, &mut state, outside, &signals, &mut always()),
            TickOutcome::OutsideWindow
        );
        let inside = t(213 * MS_PER_MINUTE + 30_000);
        assert!(matches!(
            sched.tick(EventClass::Witching, &mut state, inside, &signals, &mut always()),
            TickOutcome::Fired(_)
        ));
    }

    #[test]
    fn effective_cooldown_never_below_poll_interval() {
        let mut config = SchedulerConfig::default();
        config.chaos.cooldown_secs = 0;
        config.chaos.poll_interval_secs = 45;
        let sched = Scheduler::new(config);
        assert_eq!(sched.effective_cooldown_ms(EventClass::Chaos), 45_000);
    }

    #[test]
    fn broken_clock_is_a_no_fire() {
        let sched = Scheduler::default();
        let mut state = SchedulerState::default();
        let clock = ManualClock::new(t(0));
        clock.set_broken(true);
        let outcome = sched.poll(EventClass::Chaos, &mut state, &clock, &Signals::default(), &mut always());
        assert_eq!(outcome, TickOutcome::ClockUnavailable);
        assert!(state.last_fired(EventClass::Chaos).is_none());
    }

    #[test]
    fn state_round_trips_through_json() {
        let sched = Scheduler::default();
        let mut state = SchedulerState::default();
        sched.tick(EventClass::News, &mut state, t(5), &Signals::default(), &mut always());
        let json = serde_json::to_string(&state).expect("ser");
        let back: SchedulerState = serde_json::from_str(&json).expect("de");
        assert_eq!(back, state);
    }

    #[test]
    fn queue_sink_drains_in_order() {
        let sink = QueueSink::new();
        let sched = Scheduler::default();
        let mut state = SchedulerState::default();
        for class in [EventClass::News, EventClass::Chaos] {
            let event = sched
                .tick(class, &mut state, t(0), &Signals::default(), &mut always())
                .into_event()
                .expect("fired");
            sink.deliver(&event).expect("deliver");
        }
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].class, EventClass::News);
        assert!(sink.is_empty());
    }
}
