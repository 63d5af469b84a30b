//! Temporal memory: divergent versions of what the visitor was told.
//!
//! Records are never reconciled. The ledger only tracks which versions
//! exist; more than one means the visitor's memory is in conflict.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::Collection;
use crate::types::Timestamp;

/// A replacement phrase, optionally tied to the phrase it overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FalseMemory {
    /// Phrase this memory replaces, if any.
    #[serde(default)]
    pub original_phrase: Option<String>,
    /// What the visitor will be told instead.
    pub false_phrase: String,
    /// When the record was added.
    pub created: Timestamp,
    /// Whether it has been surfaced by [`TemporalLedger::resolve`].
    #[serde(default)]
    pub triggered: bool,
    /// Memory chain this record belongs to.
    pub version: u32,
}

/// Append-only set of memory records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalLedger {
    records: Vec<FalseMemory>,
    known_versions: BTreeSet<u32>,
}

impl Collection for TemporalLedger {
    const KEY: &'static str = "veil.temporal";
}

impl TemporalLedger {
    /// Append a record and register its version.
    pub fn add_memory(
        &mut self,
        original: Option<&str>,
        replacement: impl Into<String>,
        version: u32,
        now: Timestamp,
    ) {
        self.records.push(FalseMemory {
            original_phrase: original.map(str::to_string),
            false_phrase: replacement.into(),
            created: now,
            triggered: false,
            version,
        });
        if self.known_versions.insert(version) {
            info!(version, known = self.known_versions.len(), "New memory version");
        }
    }

    /// More than one memory version exists.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        self.known_versions.len() > 1
    }

    /// Replacement for the first record whose original phrase appears in
    /// `input` (case-insensitive). Marks the record triggered.
    pub fn resolve(&mut self, input: &str) -> Option<String> {
        let haystack = input.to_lowercase();
        let record = self.records.iter_mut().find(|r| {
            r.original_phrase
                .as_deref()
                .is_some_and(|p| !p.is_empty() && haystack.contains(&p.to_lowercase()))
        })?;
        record.triggered = true;
        debug!(version = record.version, "Memory resolved");
        Some(record.false_phrase.clone())
    }

    /// Versions seen so far, ascending.
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.known_versions.iter().copied()
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[FalseMemory] {
        &self.records
    }
}
