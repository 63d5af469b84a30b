//! Schema versioning for the persisted [`UserState`] blob.
//!
//! The aggregate is stored inside a versioned envelope:
//!
//! ```json
//! { "schema_version": 2, "state": { "visitCount": 3, ... } }
//! ```
//!
//! Older blobs are upgraded by running every migration step whose source
//! version is at or above the blob's version, in order, exactly once per
//! load. Fields introduced after a step simply fall back to their serde
//! defaults, so steps only handle renames and reshapes.
//!
//! Version history:
//! - **v0**: bare object, no envelope.
//! - **v1**: envelope; trust stored flat as `trustScore`.
//! - **v2**: trust nested as `trust { score, level, bonusPoints }`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{Result, VeilError};
use crate::state::UserState;
use crate::trust::TrustLevel;

/// Version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// On-disk wrapper around the aggregate.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Version of `state`'s shape.
    pub schema_version: u32,
    /// The aggregate, in the shape of `schema_version`.
    pub state: Value,
}

type Step = fn(&mut Value);

/// `(from_version, step)`; each step upgrades `from_version` to `from_version + 1`.
const MIGRATIONS: &[(u32, Step)] = &[(0, v0_to_v1), (1, v1_to_v2)];

/// v0 had no envelope and kept the visit counter as `visits`.
fn v0_to_v1(state: &mut Value) {
    if let Some(obj) = state.as_object_mut() {
        if let Some(visits) = obj.remove("visits") {
            obj.entry("visitCount").or_insert(visits);
        }
    }
}

/// v1 stored a flat `trustScore` number.
fn v1_to_v2(state: &mut Value) {
    let Some(obj) = state.as_object_mut() else {
        return;
    };
    if obj.get("trust").is_some_and(Value::is_object) {
        obj.remove("trustScore");
        return;
    }
    let score = obj
        .remove("trustScore")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    obj.insert(
        "trust".to_string(),
        json!({
            "score": score,
            "level": TrustLevel::from_score(score),
            "bonusPoints": 0,
        }),
    );
}

/// Decode a stored blob into the current [`UserState`], migrating as needed.
///
/// # Errors
///
/// [`VeilError::StorageCorruption`] if the bytes are not JSON, not an object,
/// or carry a schema version newer than this build understands.
pub fn decode(bytes: &[u8]) -> Result<UserState> {
    let raw: Value = serde_json::from_slice(bytes)
        .map_err(|e| VeilError::StorageCorruption(format!("unparseable state blob: {e}")))?;

    let (version, mut state) = split_envelope(raw)?;
    if version > CURRENT_SCHEMA_VERSION {
        return Err(VeilError::StorageCorruption(format!(
            "schema version {version} is newer than supported {CURRENT_SCHEMA_VERSION}"
        )));
    }

    for (from, step) in MIGRATIONS {
        if *from >= version {
            debug!(from = *from, to = *from + 1, "Migrating user state");
            step(&mut state);
        }
    }

    serde_json::from_value(state)
        .map_err(|e| VeilError::StorageCorruption(format!("state does not match schema: {e}")))
}

/// Encode the aggregate in the current envelope.
///
/// # Errors
///
/// [`VeilError::Serialization`] if encoding fails.
pub fn encode(state: &UserState) -> Result<Vec<u8>> {
    let envelope = Envelope {
        schema_version: CURRENT_SCHEMA_VERSION,
        state: serde_json::to_value(state)?,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

fn split_envelope(raw: Value) -> Result<(u32, Value)> {
    let Value::Object(mut obj) = raw else {
        return Err(VeilError::StorageCorruption("state blob is not an object".into()));
    };

    match (obj.get("schema_version").and_then(Value::as_u64), obj.contains_key("state")) {
        (Some(v), true) => {
            let version = u32::try_from(v)
                .map_err(|_| VeilError::StorageCorruption(format!("absurd schema version {v}")))?;
            let state = obj.remove("state").unwrap_or_else(|| Value::Object(Map::new()));
            Ok((version, state))
        }
        _ => Ok((0, Value::Object(obj))),
    }
}

// ---------------------------------------------------------------------------
// Legacy standalone keys
// ---------------------------------------------------------------------------

/// Standalone keys written before the aggregate existed.
pub mod legacy {
    /// Visit counter, decimal string.
    pub const VISIT_COUNT: &str = "visit_count";
    /// First visit, epoch milliseconds as decimal string.
    pub const FIRST_VISIT: &str = "first_visit";
    /// Console flags, JSON object of booleans.
    pub const CONSOLE_FLAGS: &str = "console_flags";
    /// Book codes, JSON array of strings.
    pub const BOOK_CODES: &str = "unlocked_book_codes";
    /// Clues, JSON array of strings.
    pub const CLUES: &str = "discovered_clues";

    /// Every legacy key, in migration order.
    pub const ALL: [&str; 5] = [VISIT_COUNT, FIRST_VISIT, CONSOLE_FLAGS, BOOK_CODES, CLUES];
}

/// Build a partial state from whatever legacy key values are present.
///
/// Unparseable legacy values are skipped individually; one bad key never
/// poisons the rest.
#[must_use]
pub fn state_from_legacy(values: &[(&str, Vec<u8>)]) -> UserState {
    let mut obj = Map::new();
    for (key, bytes) in values {
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim();
        match *key {
            legacy::VISIT_COUNT => {
                if let Ok(n) = text.parse::<u64>() {
                    obj.insert("visitCount".into(), json!(n));
                }
            }
            legacy::FIRST_VISIT => {
                if let Ok(ms) = text.parse::<i64>() {
                    obj.insert("firstVisit".into(), json!(ms));
                    obj.insert("lastVisit".into(), json!(ms));
                }
            }
            legacy::CONSOLE_FLAGS => {
                if let Ok(Value::Object(flags)) = serde_json::from_str::<Value>(text) {
                    let flags: Map<String, Value> = flags
                        .into_iter()
                        .filter(|(_, v)| v.is_boolean())
                        .collect();
                    obj.insert("consoleFlags".into(), Value::Object(flags));
                }
            }
            legacy::BOOK_CODES => {
                if let Ok(codes) = serde_json::from_str::<Vec<String>>(text) {
                    obj.insert("bookCodes".into(), json!({ "unlockedCodes": codes }));
                }
            }
            legacy::CLUES => {
                if let Ok(clues) = serde_json::from_str::<Vec<String>>(text) {
                    obj.insert("layeredClues".into(), json!({ "discoveredClues": clues }));
                }
            }
            _ => {}
        }
    }
    serde_json::from_value(Value::Object(obj)).unwrap_or_default()
}
