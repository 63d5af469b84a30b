//! Integration tests for veil-core: full visitor journeys over a real
//! SQLite-backed store.

use veil_core::clock::ScriptedRandom;
use veil_core::config::{StorageConfig, VeilConfig};
use veil_core::diary::{Diary, EntryKind};
use veil_core::kv::{KeyValueStore, SqliteStore};
use veil_core::masks::MaskWardrobe;
use veil_core::migration::legacy;
use veil_core::scheduler::{EventClass, Scheduler, SchedulerState, Signals, TickOutcome};
use veil_core::seeds::{SeedGarden, SeedStage};
use veil_core::store::{Collection, StateStore, USER_STATE_KEY};
use veil_core::temporal::TemporalLedger;
use veil_core::trust::{self, Rank, TrustLevel};
use veil_core::whispers::{DiscoverOutcome, WhisperBook};
use veil_core::{MS_PER_DAY, MS_PER_HOUR, Timestamp};

fn t(ms: i64) -> Timestamp {
    Timestamp::from_millis(ms)
}

fn open(dir: &tempfile::TempDir) -> StateStore<SqliteStore> {
    let path = dir.path().join("veil.db");
    StateStore::new(SqliteStore::open(&path, &StorageConfig::default()).expect("open"))
}

// ---------------------------------------------------------------------------
// State persistence
// ---------------------------------------------------------------------------

#[test]
fn visitor_history_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = VeilConfig::default();

    {
        let store = open(&dir);
        let mut state = store.load(t(1_000));
        state.set_console_flag("help");
        state.unlock_book_code("alpha");
        state.record_event("visited_campfire");
        trust::refresh_trust(&mut state, &config.trust);
        store.save(&state).expect("save");
    }

    let store = open(&dir);
    let state = store.load(t(2_000));
    assert_eq!(state.visit_count(), 2);
    assert!(state.has_console_flag("help"));
    assert!(state.book_codes().contains("alpha"));
    assert_eq!(state.first_visit(), t(1_000));
    assert_eq!(state.last_visit(), t(2_000));
    assert_eq!(state.pages_visited(), 1);
}

#[test]
fn legacy_sprawl_is_folded_into_aggregate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let kv = store.backend();
    kv.set(legacy::VISIT_COUNT, b"4").expect("set");
    kv.set(legacy::FIRST_VISIT, b"500").expect("set");
    kv.set(legacy::CONSOLE_FLAGS, br#"{"whoami": true}"#).expect("set");
    kv.set(legacy::CLUES, br#"["lantern"]"#).expect("set");

    let state = store.load(t(9_000));
    assert_eq!(state.visit_count(), 5);
    assert_eq!(state.first_visit(), t(500));
    assert!(state.has_console_flag("whoami"));
    assert!(state.layered_clues().contains("lantern"));

    let keys = store.backend().keys().expect("keys");
    assert!(keys.iter().all(|k| !legacy::ALL.contains(&k.as_str())));
    assert!(keys.iter().any(|k| k == USER_STATE_KEY));
}

#[test]
fn pre_envelope_blob_is_upgraded_on_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    store
        .backend()
        .set(USER_STATE_KEY, br#"{"visits": 3, "trustScore": 120}"#)
        .expect("set");

    let state = store.load(t(1));
    assert_eq!(state.visit_count(), 4);
    assert_eq!(state.trust.level, TrustLevel::Medium);

    let raw = store.backend().get(USER_STATE_KEY).expect("get").expect("present");
    let value: serde_json::Value = serde_json::from_slice(&raw).expect("json");
    assert_eq!(value["schema_version"], 2);
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[test]
fn collections_are_independently_keyed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let config = VeilConfig::default();

    let mut garden: SeedGarden = store.load_collection();
    let seed = garden.plant("do not answer the door", "campfire", false, t(0));
    store.save_collection(&garden).expect("save seeds");

    let mut diary: Diary = store.load_collection();
    diary.create("I saw it", EntryKind::Memory, "fear", true, t(0), &config.diary);
    store.save_collection(&diary).expect("save diary");

    let mut masks: MaskWardrobe = store.load_collection();
    masks.unlock("wolf", "The Wolf", "campfire", t(0));
    masks.activate("wolf").expect("activate");
    store.save_collection(&masks).expect("save masks");

    let garden: SeedGarden = store.load_collection();
    let diary: Diary = store.load_collection();
    let masks: MaskWardrobe = store.load_collection();
    assert_eq!(garden.get(seed).map(|s| s.phrase.as_str()), Some("do not answer the door"));
    assert_eq!(diary.len(), 1);
    assert_eq!(masks.active().map(|m| m.mask_id.as_str()), Some("wolf"));
    assert_eq!(store.snapshot().visit_count(), 0);
}

#[test]
fn corrupt_collection_falls_back_to_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    store.backend().set(WhisperBook::KEY, b"{{{").expect("set");
    let book: WhisperBook = store.load_collection();
    assert_eq!(book, WhisperBook::default());
}

// ---------------------------------------------------------------------------
// Narrative journeys
// ---------------------------------------------------------------------------

#[test]
fn seed_lifecycle_scenario() {
    let config = VeilConfig::default();
    let mut garden = SeedGarden::new();
    let id = garden.plant("the lantern in the trees", "campfire", true, t(0));
    for h in 1..=3 {
        garden.nurture(id, t(h * MS_PER_HOUR)).expect("nurture");
    }

    let at_10 = garden.evaluate(id, t(10 * MS_PER_DAY), &config.seeds).expect("eval");
    let at_20 = garden.evaluate(id, t(20 * MS_PER_DAY), &config.seeds).expect("eval");
    assert_eq!(at_10, SeedStage::Growing);
    assert_eq!(at_20, SeedStage::Decaying);
    assert_eq!(garden.get(id).expect("seed").visits, 4);
}

#[test]
fn whisper_and_memory_journey() {
    let mut book = WhisperBook::default();
    let before = book.remaining();
    assert!(matches!(book.discover("w-mirror", t(1)), DiscoverOutcome::Discovered(_)));
    assert!(matches!(book.discover("w-mirror", t(2)), DiscoverOutcome::AlreadyDiscovered(_)));
    assert_eq!(book.remaining(), before - 1);

    let mut ledger = TemporalLedger::default();
    ledger.add_memory(Some("the cabin"), "there was no cabin", 1, t(0));
    ledger.add_memory(Some("the cabin"), "the cabin burned", 1, t(0));
    assert!(!ledger.has_conflicts());
    ledger.add_memory(Some("the cabin"), "you lived in the cabin", 2, t(0));
    assert!(ledger.has_conflicts());
    assert_eq!(ledger.resolve("where is THE CABIN?").as_deref(), Some("there was no cabin"));
}

#[test]
fn rank_climbs_with_engagement() {
    let config = VeilConfig::default();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);

    let mut state = store.load(t(0));
    assert_eq!(trust::rank(trust::score(&state, &config.trust)), Rank::Drifter);

    for code in ["a", "b", "c", "d"] {
        state.unlock_book_code(code);
    }
    for clue in ["x", "y", "z"] {
        state.discover_clue(clue);
    }
    let score = trust::refresh_trust(&mut state, &config.trust);
    store.save(&state).expect("save");

    assert!(score >= 100);
    assert!(trust::rank(score) >= Rank::Watcher);
    assert_eq!(store.snapshot().trust.score, score);
}

#[test]
fn scheduler_cooldowns_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sched = Scheduler::default();
    let mut rng = ScriptedRandom::constant(0.0);

    {
        let store = open(&dir);
        let mut state: SchedulerState = store.load_collection();
        let fired = sched.tick(EventClass::News, &mut state, t(0), &Signals::default(), &mut rng);
        assert!(matches!(fired, TickOutcome::Fired(_)));
        store.save_collection(&state).expect("save");
    }

    let store = open(&dir);
    let mut state: SchedulerState = store.load_collection();
    let again = sched.tick(EventClass::News, &mut state, t(1_000), &Signals::default(), &mut rng);
    assert_eq!(again, TickOutcome::CoolingDown);
}

#[test]
fn rotating_backups_keep_configured_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("veil.db");
    let config = StorageConfig {
        backup_count: 2,
        ..StorageConfig::default()
    };
    let kv = SqliteStore::open(&path, &config).expect("open");
    kv.set("k", b"v").expect("set");
    for _ in 0..4 {
        kv.create_rotating_backup().expect("backup");
    }
    assert!(kv.backup_path(1).exists());
    assert!(kv.backup_path(2).exists());
    assert!(!kv.backup_path(3).exists());
    assert!(kv.integrity_check().expect("check"));
}
