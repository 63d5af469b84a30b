//! End-to-end tests for the application context over in-memory backends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use veil_core::clock::{ManualClock, ScriptedRandom};
use veil_core::config::{ProbabilityRule, VeilConfig};
use veil_core::diary::EntryKind;
use veil_core::kv::{KeyValueStore, MemoryStore};
use veil_core::scheduler::{EventClass, EventSink, NarrativeEvent, NarrativePayload, QueueSink};
use veil_core::seeds::SeedStage;
use veil_core::types::{MS_PER_DAY, MS_PER_HOUR, SeedId, Timestamp};
use veil_core::whispers::DiscoverOutcome;
use veil_core::{Rank, VeilError};
use veil_host::{AppContext, DefaultContext, SchedulerRunner, UserAction};
use veil_sync::{Remote, SyncOutcome};

type TestContext = AppContext<MemoryStore, Remote>;

fn t(ms: i64) -> Timestamp {
    Timestamp::from_millis(ms)
}

/// Every class silenced except the ones a test turns back on.
fn quiet_config() -> VeilConfig {
    let mut config = VeilConfig::default();
    for policy in [
        &mut config.scheduler.chaos,
        &mut config.scheduler.idle_whisper,
        &mut config.scheduler.day_night,
        &mut config.scheduler.news,
        &mut config.scheduler.witching,
    ] {
        policy.probability = ProbabilityRule::Fixed(0.0);
    }
    config
}

fn context(config: VeilConfig) -> (TestContext, Arc<ManualClock>, Arc<QueueSink>) {
    let clock = Arc::new(ManualClock::new(t(1_000)));
    let sink = Arc::new(QueueSink::new());
    let ctx = AppContext::new(config, MemoryStore::new(), Remote::Disabled, sink.clone())
        .with_clock(clock.clone())
        .with_random(Box::new(ScriptedRandom::constant(0.0)));
    (ctx, clock, sink)
}

// ---------------------------------------------------------------------------
// State, actions, trust
// ---------------------------------------------------------------------------

#[test]
fn actions_accumulate_history_and_trust() {
    let (ctx, clock, _) = context(quiet_config());
    assert_eq!(ctx.load().visit_count(), 1);

    assert!(ctx.apply(UserAction::PageVisit("/campfire".into())));
    assert!(!ctx.apply(UserAction::PageVisit("campfire".into())));
    assert!(ctx.apply(UserAction::ConsoleCommand("help".into())));
    assert!(!ctx.apply(UserAction::ConsoleCommand("help".into())));
    assert!(ctx.apply(UserAction::BookCode("alpha".into())));
    assert!(ctx.apply(UserAction::Clue("lantern".into())));
    assert!(!ctx.apply(UserAction::Click));

    clock.advance(MS_PER_HOUR);
    let state = ctx.load();
    assert_eq!(state.visit_count(), 2);
    assert_eq!(state.event_count("visited_campfire"), 2);
    assert_eq!(state.event_count("command_help"), 2);
    assert_eq!(state.trust.score, ctx.score());
    assert_eq!(ctx.score(), 2 * 2 + 15 + 25 + 20);
    assert_eq!(ctx.rank(), Rank::Drifter);
}

#[test]
fn timer_reads_do_not_count_visits() {
    let (ctx, _, _) = context(quiet_config());
    ctx.load();
    for class in EventClass::ALL {
        ctx.run_scheduled(class);
    }
    assert_eq!(ctx.state().visit_count(), 1);
}

#[test]
fn identity_is_stable() {
    let (ctx, _, _) = context(quiet_config());
    assert_eq!(ctx.identity(), ctx.identity());
}

#[test]
fn default_context_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("veil.db");
    let sink: Arc<dyn EventSink> = Arc::new(QueueSink::new());

    let identity = {
        let ctx = DefaultContext::open(quiet_config(), &path, Arc::clone(&sink)).expect("open");
        ctx.load();
        ctx.apply(UserAction::Clue("lantern".into()));
        ctx.identity()
    };

    let ctx = DefaultContext::open(quiet_config(), &path, sink).expect("reopen");
    let state = ctx.load();
    assert_eq!(state.visit_count(), 2);
    assert!(state.layered_clues().contains("lantern"));
    assert_eq!(ctx.identity(), identity);
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[test]
fn seed_lifecycle_through_context() {
    let (ctx, clock, _) = context(quiet_config());
    clock.set(t(0));
    let id = ctx
        .plant_seed("the lantern in the trees", "campfire", false)
        .expect("planted");
    for _ in 0..3 {
        clock.advance(MS_PER_HOUR);
        assert!(ctx.nurture_seed(id));
    }

    clock.set(t(10 * MS_PER_DAY));
    assert_eq!(ctx.seeds()[0].stage, SeedStage::Growing);
    clock.set(t(20 * MS_PER_DAY));
    assert_eq!(ctx.seeds()[0].stage, SeedStage::Decaying);

    assert!(!ctx.nurture_seed(SeedId::new()));
}

#[test]
fn unknown_ids_become_false() {
    let (ctx, _, _) = context(quiet_config());
    assert!(!ctx.activate_mask("nobody"));
    assert!(ctx.unlock_mask("wolf", "The Wolf", "campfire"));
    assert!(!ctx.unlock_mask("wolf", "The Wolf", "campfire"));
    assert!(ctx.activate_mask("wolf"));
    assert_eq!(ctx.active_mask().map(|m| m.mask_id), Some("wolf".to_string()));
}

#[test]
fn whispers_diary_and_memories() {
    let (ctx, clock, _) = context(quiet_config());

    assert!(matches!(ctx.discover_whisper("w-static"), DiscoverOutcome::Discovered(_)));
    assert!(matches!(ctx.discover_whisper("w-static"), DiscoverOutcome::AlreadyDiscovered(_)));
    assert_eq!(ctx.whispers().discovered_count(), 1);
    assert!(!ctx.whisper_hint().is_empty());

    ctx.create_entry("keep this", EntryKind::Note, "", false);
    ctx.create_entry("fading", EntryKind::Dream, "dread", true);
    assert_eq!(ctx.visible_entries().len(), 2);
    clock.advance(ctx.config().diary.ephemeral_window_ms);
    let visible = ctx.visible_entries();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].content, "keep this");

    ctx.add_memory(Some("the cabin"), "there was no cabin", 1);
    assert!(!ctx.has_conflicts());
    ctx.add_memory(Some("the cabin"), "the cabin burned", 2);
    assert!(ctx.has_conflicts());
    assert_eq!(ctx.resolve_memory("the Cabin?").as_deref(), Some("there was no cabin"));
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[test]
fn chaos_event_awards_bonus_and_reaches_sink() {
    let mut config = quiet_config();
    config.scheduler.chaos.probability = ProbabilityRule::Fixed(1.0);
    let (ctx, _, sink) = context(config);
    ctx.load();
    let before = ctx.score();

    let event = ctx.run_scheduled(EventClass::Chaos).expect("fired");
    assert!(matches!(event.payload, NarrativePayload::Chaos { .. }));
    assert_eq!(ctx.score(), before + ctx.config().scheduler.chaos_bonus);
    assert_eq!(sink.len(), 1);

    // Immediately again: cooling down.
    assert!(ctx.run_scheduled(EventClass::Chaos).is_none());
    assert_eq!(sink.len(), 1);
}

#[test]
fn idle_whisper_follows_reported_idle_time() {
    let mut config = quiet_config();
    config.scheduler.idle_whisper.probability = ProbabilityRule::Fixed(1.0);
    let (ctx, _, _) = context(config);

    ctx.apply(UserAction::PageVisit("mirror".into()));
    assert!(ctx.run_scheduled(EventClass::IdleWhisper).is_none());

    ctx.apply(UserAction::Idle { idle_ms: 90_000 });
    let event = ctx.run_scheduled(EventClass::IdleWhisper).expect("fired");
    match event.payload {
        NarrativePayload::IdleWhisper { page, .. } => assert_eq!(page.to_string(), "mirror"),
        other => panic!("unexpected {other:?}"),
    }
}

struct PanickingSink;

impl EventSink for PanickingSink {
    fn deliver(&self, _event: &NarrativeEvent) -> veil_core::Result<()> {
        panic!("renderer exploded");
    }
}

struct RejectingSink;

impl EventSink for RejectingSink {
    fn deliver(&self, _event: &NarrativeEvent) -> veil_core::Result<()> {
        Err(VeilError::Sink("toast queue full".into()))
    }
}

#[test]
fn failing_sinks_never_stop_future_ticks() {
    let mut config = quiet_config();
    config.scheduler.news.probability = ProbabilityRule::Fixed(1.0);
    config.scheduler.news.cooldown_secs = 1;
    config.scheduler.news.poll_interval_secs = 1;

    for sink in [Arc::new(PanickingSink) as Arc<dyn EventSink>, Arc::new(RejectingSink)] {
        let clock = Arc::new(ManualClock::new(t(0)));
        let ctx = AppContext::new(config.clone(), MemoryStore::new(), Remote::Disabled, sink)
            .with_clock(clock.clone())
            .with_random(Box::new(ScriptedRandom::constant(0.0)));

        assert!(ctx.run_scheduled(EventClass::News).is_some());
        clock.advance(1_000);
        assert!(ctx.run_scheduled(EventClass::News).is_some());
    }
}

#[test]
fn broken_clock_means_no_fire() {
    let mut config = quiet_config();
    config.scheduler.chaos.probability = ProbabilityRule::Fixed(1.0);
    let (ctx, clock, sink) = context(config);
    clock.set_broken(true);
    assert!(ctx.run_scheduled(EventClass::Chaos).is_none());
    assert!(sink.is_empty());
}

/// Memory backend whose reads can be switched to fail, like a busy database.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing_reads: AtomicBool,
}

impl FlakyStore {
    fn fail_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> veil_core::Result<Option<Vec<u8>>> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(VeilError::Io(std::io::Error::other("database is locked")));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> veil_core::Result<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> veil_core::Result<bool> {
        self.inner.remove(key)
    }

    fn keys(&self) -> veil_core::Result<Vec<String>> {
        self.inner.keys()
    }
}

#[tokio::test]
async fn read_failures_neither_fire_events_nor_overwrite_history() {
    let mut config = quiet_config();
    config.scheduler.chaos.probability = ProbabilityRule::Fixed(1.0);
    let clock = Arc::new(ManualClock::new(t(1_000)));
    let sink = Arc::new(QueueSink::new());
    let ctx = AppContext::new(config, FlakyStore::default(), Remote::Disabled, sink.clone())
        .with_clock(clock.clone())
        .with_random(Box::new(ScriptedRandom::constant(0.0)));

    for _ in 0..5 {
        ctx.load();
    }
    assert!(ctx.apply(UserAction::BookCode("alpha".into())));
    assert!(ctx.run_scheduled(EventClass::Chaos).is_some());
    assert!(ctx.unlock_mask("wolf", "The Wolf", "campfire"));
    let before = ctx.state();
    let score = ctx.score();

    ctx.store().backend().fail_reads(true);
    clock.advance(1_000);
    assert!(ctx.run_scheduled(EventClass::Chaos).is_none());
    assert!(!ctx.apply(UserAction::Clue("lantern".into())));
    assert!(ctx.plant_seed("the lantern", "campfire", false).is_none());
    assert!(!ctx.unlock_mask("crow", "The Crow", "archive"));
    assert_eq!(ctx.sync().await, SyncOutcome::Failed);
    assert_eq!(ctx.load().visit_count(), 1);
    assert_eq!(sink.len(), 1);

    ctx.store().backend().fail_reads(false);
    assert_eq!(ctx.state(), before);
    assert_eq!(ctx.score(), score);
    assert_eq!(ctx.masks().len(), 1);
    assert!(ctx.seeds().is_empty());
    // The persisted cooldown is still honoured once reads recover.
    assert!(ctx.run_scheduled(EventClass::Chaos).is_none());
}

// ---------------------------------------------------------------------------
// Sync and runner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_remote_degrades_quietly() {
    let (ctx, clock, _) = context(quiet_config());
    ctx.load();
    assert_eq!(ctx.sync().await, SyncOutcome::Failed);
    clock.advance(1_000);
    assert_eq!(ctx.sync().await, SyncOutcome::CoolingDown);
    assert!(ctx.leaderboard(10).await.is_empty());
    assert_eq!(ctx.remote_rank().await.position, 0);
}

#[tokio::test(start_paused = true)]
async fn runner_fires_on_interval_and_stops_when_cancelled() {
    let mut config = quiet_config();
    config.scheduler.chaos.probability = ProbabilityRule::Fixed(1.0);
    config.scheduler.chaos.poll_interval_secs = 1;
    config.scheduler.chaos.cooldown_secs = 1;
    let (ctx, clock, sink) = context(config);
    let ctx = Arc::new(ctx);
    clock.set(t(0));

    let mut handle = SchedulerRunner::spawn(Arc::clone(&ctx));
    assert!(handle.is_running());

    // Ticks land at 1s, 2s, 3s. The manual clock is moved half a period
    // ahead of each one so the tick always reads a whole second.
    tokio::time::sleep(Duration::from_millis(500)).await;
    for i in 1..=3 {
        clock.set(t(i * 1_000));
        tokio::time::sleep(Duration::from_millis(1_000)).await;
    }
    assert_eq!(sink.len(), 3);

    handle.cancel();
    tokio::task::yield_now().await;
    clock.advance(10_000);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sink.len(), 3);
    assert!(!handle.is_running());
}
