//! The application context handed to every renderer callback.
//!
//! All collaborators are explicit fields; nothing is looked up globally.
//! Every load→mutate→save cycle runs under one writer lock, so two timers
//! firing together can no longer overwrite each other's update.
//!
//! Nothing here returns an error to the renderer. Missing entities become
//! `false`, storage and transport problems are logged and degrade to the
//! zero value.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use veil_core::clock::{Clock, RandomSource, SystemClock, ThreadRandom};
use veil_core::config::VeilConfig;
use veil_core::diary::{Diary, DiaryEntry, EntryKind};
use veil_core::kv::{KeyValueStore, SqliteStore};
use veil_core::masks::{Mask, MaskWardrobe};
use veil_core::narrative::Page;
use veil_core::scheduler::{
    EventClass, EventSink, NarrativeEvent, NarrativePayload, Scheduler, SchedulerState, Signals,
    TickOutcome,
};
use veil_core::seeds::{Seed, SeedGarden, SeedTransition};
use veil_core::state::{COMMAND_PREFIX, UserState, VISITED_PREFIX};
use veil_core::store::{Collection, StateStore};
use veil_core::temporal::TemporalLedger;
use veil_core::trust::{self, Rank, TrustLevel};
use veil_core::types::{EntryId, Identity, SeedId, Timestamp};
use veil_core::whispers::{DiscoverOutcome, WhisperBook};
use veil_core::{Result, VeilError};
use veil_sync::{LeaderboardEntry, RankInfo, Remote, RemoteStore, SyncOutcome, SyncService};

use crate::events::{UserAction, page_key};

/// Context over the production backends.
pub type DefaultContext = AppContext<SqliteStore, Remote>;

/// What the renderer told us about the visitor's activity.
#[derive(Debug, Clone, Copy)]
struct Activity {
    last_action: Timestamp,
    page: Page,
}

/// Owns the state store, scheduler, sync service and their seams.
pub struct AppContext<S, R> {
    config: VeilConfig,
    store: StateStore<S>,
    scheduler: Scheduler,
    sync: SyncService<R>,
    clock: Arc<dyn Clock>,
    rng: Mutex<Box<dyn RandomSource>>,
    sink: Arc<dyn EventSink>,
    writer: Mutex<()>,
    activity: Mutex<Activity>,
}

impl DefaultContext {
    /// Open the SQLite store at `path` and pick the remote from config.
    ///
    /// # Errors
    ///
    /// Database errors opening the store, or [`VeilError::Config`] for a bad
    /// `[sync]` section.
    pub fn open(config: VeilConfig, path: &Path, sink: Arc<dyn EventSink>) -> Result<Self> {
        let kv = SqliteStore::open(path, &config.storage)?;
        let remote = Remote::from_config(&config.sync).map_err(|e| VeilError::Config(e.to_string()))?;
        Ok(Self::new(config, kv, remote, sink))
    }
}

impl<S: KeyValueStore, R: RemoteStore> AppContext<S, R> {
    /// Build a context with the system clock and an entropy-seeded random source.
    pub fn new(config: VeilConfig, kv: S, remote: R, sink: Arc<dyn EventSink>) -> Self {
        let sync = SyncService::new(remote, &config.sync, config.trust.clone());
        let now = Timestamp::now();
        Self {
            scheduler: Scheduler::new(config.scheduler.clone()),
            store: StateStore::new(kv),
            sync,
            clock: Arc::new(SystemClock),
            rng: Mutex::new(Box::new(ThreadRandom::from_entropy())),
            sink,
            writer: Mutex::new(()),
            activity: Mutex::new(Activity {
                last_action: now,
                page: Page::Gate,
            }),
            config,
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        if let Ok(now) = clock.now() {
            self.activity.get_mut().last_action = now;
        }
        self.clock = clock;
        self
    }

    /// Replace the random source.
    #[must_use]
    pub fn with_random(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &VeilConfig {
        &self.config
    }

    /// The typed store, for collaborators that only read.
    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    fn now(&self) -> Timestamp {
        self.clock.now().unwrap_or_else(|e| {
            warn!(error = %e, "Clock unavailable; using system time");
            Timestamp::now()
        })
    }

    /// Load a collection, apply `f`, save it back, all under the writer lock.
    /// `None` when the collection could not be read; nothing is written then.
    fn with_collection<C: Collection, T>(&self, f: impl FnOnce(&mut C, Timestamp) -> T) -> Option<T> {
        let _guard = self.writer.lock();
        let now = self.now();
        let mut value: C = match self.store.try_load_collection() {
            Ok(value) => value,
            Err(e) => {
                warn!(key = C::KEY, error = %e, "Collection read failed; change dropped");
                return None;
            }
        };
        let out = f(&mut value, now);
        if let Err(e) = self.store.save_collection(&value) {
            warn!(key = C::KEY, error = %e, "Could not persist collection");
        }
        Some(out)
    }

    /// Snapshot the state, apply `f`, refresh trust, save, all under the writer lock.
    /// `None` when the state could not be read; nothing is written then.
    fn with_state<T>(&self, f: impl FnOnce(&mut UserState, Timestamp) -> T) -> Option<T> {
        let _guard = self.writer.lock();
        let now = self.now();
        let mut state = match self.store.try_snapshot() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "User state read failed; change dropped");
                return None;
            }
        };
        let out = f(&mut state, now);
        trust::refresh_trust(&mut state, &self.config.trust);
        if let Err(e) = self.store.save(&state) {
            warn!(error = %e, "Could not persist user state");
        }
        Some(out)
    }

    // ------------------------------------------------------------------
    // State and trust
    // ------------------------------------------------------------------

    /// Session start: count the visit and return the refreshed state.
    ///
    /// If the store cannot be read, the session runs on an unsaved fresh
    /// state and persisted history is left alone.
    pub fn load(&self) -> UserState {
        let _guard = self.writer.lock();
        let now = self.now();
        let mut state = match self.store.try_load(now) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "User state read failed; session state will not be saved");
                let mut state = UserState::default();
                state.begin_visit(now);
                trust::refresh_trust(&mut state, &self.config.trust);
                return state;
            }
        };
        trust::refresh_trust(&mut state, &self.config.trust);
        if let Err(e) = self.store.save(&state) {
            warn!(error = %e, "Could not persist refreshed trust");
        }
        state
    }

    /// Current state without visit accounting.
    pub fn state(&self) -> UserState {
        self.store.snapshot()
    }

    /// Overwrite the state. Returns `false` if it could not be persisted.
    pub fn save(&self, state: &UserState) -> bool {
        let _guard = self.writer.lock();
        self.store
            .save(state)
            .map_err(|e| warn!(error = %e, "Could not persist user state"))
            .is_ok()
    }

    /// Current trust score.
    pub fn score(&self) -> i64 {
        trust::score(&self.state(), &self.config.trust)
    }

    /// Current rank.
    pub fn rank(&self) -> Rank {
        trust::rank(self.score())
    }

    /// Stable anonymous identity.
    pub fn identity(&self) -> Identity {
        let _guard = self.writer.lock();
        self.store.identity(self.now())
    }

    /// Record a user action. Returns `true` if it added new history.
    pub fn apply(&self, action: UserAction) -> bool {
        let now = self.now();
        {
            let mut activity = self.activity.lock();
            match &action {
                UserAction::Idle { idle_ms } => {
                    activity.last_action = now.plus_millis(-(*idle_ms).max(0));
                }
                UserAction::PageVisit(slug) => {
                    activity.page = Page::parse(slug);
                    activity.last_action = now;
                }
                _ => activity.last_action = now,
            }
        }
        if !action.is_recorded() {
            return false;
        }

        self.with_state(|state, _| match action {
            UserAction::PageVisit(slug) => {
                state.record_event(format!("{VISITED_PREFIX}{}", page_key(&slug))) == 1
            }
            UserAction::ConsoleCommand(name) => {
                state.record_event(format!("{COMMAND_PREFIX}{name}"));
                state.set_console_flag(name)
            }
            UserAction::BookCode(code) => state.unlock_book_code(code),
            UserAction::Clue(clue) => state.discover_clue(clue),
            UserAction::LegacyWritten => {
                let first = !state.legacy_written();
                state.mark_legacy_written();
                first
            }
            UserAction::Click | UserAction::Idle { .. } => false,
        })
        .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Seeds
    // ------------------------------------------------------------------

    /// Plant a seed. `None` if the garden could not be read.
    pub fn plant_seed(&self, phrase: &str, context: &str, is_global: bool) -> Option<SeedId> {
        self.with_collection(|garden: &mut SeedGarden, now| garden.plant(phrase, context, is_global, now))
    }

    /// Nurture a seed. `false` if it does not exist.
    pub fn nurture_seed(&self, id: SeedId) -> bool {
        self.with_collection(|garden: &mut SeedGarden, now| {
            garden
                .nurture(id, now)
                .map_err(|e| debug!(error = %e, "Nurture ignored"))
                .is_ok()
        })
        .unwrap_or(false)
    }

    /// Re-evaluate every seed and return what changed.
    pub fn evaluate_seeds(&self) -> Vec<SeedTransition> {
        let config = self.config.seeds.clone();
        self.with_collection(|garden: &mut SeedGarden, now| garden.evaluate_all(now, &config))
            .unwrap_or_default()
    }

    /// All seeds, evaluated as of now.
    pub fn seeds(&self) -> Vec<Seed> {
        let config = self.config.seeds.clone();
        self.with_collection(|garden: &mut SeedGarden, now| {
            garden.evaluate_all(now, &config);
            garden.list().to_vec()
        })
        .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Whispers
    // ------------------------------------------------------------------

    /// Try to discover a whisper by id or content fragment.
    pub fn discover_whisper(&self, matcher: &str) -> DiscoverOutcome {
        self.with_collection(|book: &mut WhisperBook, now| book.discover(matcher, now))
            .unwrap_or(DiscoverOutcome::NoMatch)
    }

    /// Hint toward an undiscovered whisper.
    pub fn whisper_hint(&self) -> &'static str {
        let book: WhisperBook = self.store.load_collection();
        let mut rng = self.rng.lock();
        book.hint(&mut **rng)
    }

    /// The whisper book.
    pub fn whispers(&self) -> WhisperBook {
        self.store.load_collection()
    }

    // ------------------------------------------------------------------
    // Diary
    // ------------------------------------------------------------------

    /// Write a diary entry. `None` if the diary could not be read.
    pub fn create_entry(
        &self,
        content: &str,
        kind: EntryKind,
        emotional_context: &str,
        is_ephemeral: bool,
    ) -> Option<EntryId> {
        let config = self.config.diary.clone();
        self.with_collection(|diary: &mut Diary, now| {
            diary
                .create(content, kind, emotional_context, is_ephemeral, now, &config)
                .id
        })
    }

    /// Entries visible now, newest first.
    pub fn visible_entries(&self) -> Vec<DiaryEntry> {
        let diary: Diary = self.store.load_collection();
        diary.list_visible(self.now()).into_iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Masks
    // ------------------------------------------------------------------

    /// Unlock a mask. `false` if it was already unlocked.
    pub fn unlock_mask(&self, mask_id: &str, name: &str, trigger: &str) -> bool {
        self.with_collection(|w: &mut MaskWardrobe, now| w.unlock(mask_id, name, trigger, now))
            .unwrap_or(false)
    }

    /// Wear a mask. `false` if it was never unlocked.
    pub fn activate_mask(&self, mask_id: &str) -> bool {
        self.with_collection(|w: &mut MaskWardrobe, _| {
            w.activate(mask_id)
                .map_err(|e| debug!(error = %e, "Activation ignored"))
                .is_ok()
        })
        .unwrap_or(false)
    }

    /// The mask being worn.
    pub fn active_mask(&self) -> Option<Mask> {
        let w: MaskWardrobe = self.store.load_collection();
        w.active().cloned()
    }

    /// All unlocked masks.
    pub fn masks(&self) -> Vec<Mask> {
        let w: MaskWardrobe = self.store.load_collection();
        w.list().to_vec()
    }

    // ------------------------------------------------------------------
    // Temporal memory
    // ------------------------------------------------------------------

    /// Record a (possibly contradictory) memory. `false` if the ledger
    /// could not be read.
    pub fn add_memory(&self, original: Option<&str>, replacement: &str, version: u32) -> bool {
        self.with_collection(|ledger: &mut TemporalLedger, now| {
            ledger.add_memory(original, replacement, version, now);
        })
        .is_some()
    }

    /// Whether divergent memory versions exist.
    pub fn has_conflicts(&self) -> bool {
        let ledger: TemporalLedger = self.store.load_collection();
        ledger.has_conflicts()
    }

    /// Replacement text for `input`, if any memory covers it.
    pub fn resolve_memory(&self, input: &str) -> Option<String> {
        self.with_collection(|ledger: &mut TemporalLedger, _| ledger.resolve(input))
            .flatten()
    }

    // ------------------------------------------------------------------
    // Remote sync
    // ------------------------------------------------------------------

    /// Push the current projection upstream if the cooldown allows.
    ///
    /// Reports [`SyncOutcome::Failed`] without spending the cooldown when
    /// local state or identity cannot be read.
    pub async fn sync(&self) -> SyncOutcome {
        let read = {
            let _guard = self.writer.lock();
            let now = self.now();
            self.store
                .try_snapshot()
                .and_then(|state| Ok((state, self.store.try_identity(now)?)))
        };
        match read {
            Ok((state, identity)) => self.sync.sync(&state, &identity, self.now()).await,
            Err(e) => {
                warn!(error = %e, "Local state unreadable; sync skipped");
                SyncOutcome::Failed
            }
        }
    }

    /// Top of the leaderboard, empty on failure.
    pub async fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.sync.fetch_leaderboard(limit).await
    }

    /// This visitor's leaderboard position, zero on failure.
    pub async fn remote_rank(&self) -> RankInfo {
        let identity = self.identity();
        self.sync.fetch_rank(&identity).await
    }

    // ------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------

    /// Poll one event class. Fired events are persisted, rewarded and handed
    /// to the sink; nothing that goes wrong here reaches the caller.
    pub fn run_scheduled(&self, class: EventClass) -> Option<NarrativeEvent> {
        let _guard = self.writer.lock();

        let read = self
            .store
            .try_load_collection::<SchedulerState>()
            .and_then(|sched| Ok((sched, self.store.try_snapshot()?)));
        let (mut sched_state, mut state) = match read {
            Ok(pair) => pair,
            Err(e) => {
                warn!(%class, error = %e, "Storage read failed; tick skipped");
                return None;
            }
        };
        let trust_level = TrustLevel::from_score(trust::score(&state, &self.config.trust));
        let signals = {
            let activity = *self.activity.lock();
            let idle_ms = match self.clock.now() {
                Ok(now) => now.millis_since(activity.last_action),
                Err(_) => 0,
            };
            Signals {
                trust: trust_level,
                idle_ms,
                page: activity.page,
            }
        };

        let outcome = {
            let mut rng = self.rng.lock();
            self.scheduler
                .poll(class, &mut sched_state, self.clock.as_ref(), &signals, &mut **rng)
        };
        let event = match outcome {
            TickOutcome::Fired(event) => event,
            other => {
                debug!(%class, outcome = ?other, "No event");
                return None;
            }
        };

        if let Err(e) = self.store.save_collection(&sched_state) {
            warn!(%class, error = %e, "Could not persist scheduler state");
        }

        if let NarrativePayload::Chaos { kind, .. } = &event.payload {
            let key = format!("chaos_{}", kind.key());
            state.award_bonus(&key, self.config.scheduler.chaos_bonus);
            trust::refresh_trust(&mut state, &self.config.trust);
            if let Err(e) = self.store.save(&state) {
                warn!(error = %e, "Could not persist chaos bonus");
            }
        }

        let sink = Arc::clone(&self.sink);
        match catch_unwind(AssertUnwindSafe(|| sink.deliver(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%class, error = %e, "Event sink rejected event"),
            Err(_) => warn!(%class, "Event sink panicked"),
        }
        Some(event)
    }
}
