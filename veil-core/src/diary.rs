//! Diary entries, some of which fade after a fixed window.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DiaryConfig;
use crate::store::Collection;
use crate::types::{EntryId, Timestamp};

/// What kind of entry this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Written by the visitor.
    Note,
    /// Recorded after a narrative event.
    Memory,
    /// A dream fragment.
    Dream,
    /// Something the visitor confessed.
    Confession,
    /// Left behind by the engine.
    System,
}

impl EntryKind {
    fn base_importance(self) -> u8 {
        match self {
            Self::System => 10,
            Self::Note => 20,
            Self::Dream => 35,
            Self::Memory => 40,
            Self::Confession => 60,
        }
    }
}

/// One diary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryEntry {
    /// Unique id.
    pub id: EntryId,
    /// Entry text.
    pub content: String,
    /// Kind of entry.
    #[serde(rename = "entryType")]
    pub kind: EntryKind,
    /// Free-form emotional tag.
    pub emotional_context: String,
    /// Whether the entry expires.
    pub is_ephemeral: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Set iff `is_ephemeral`.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    /// 0..=100.
    pub importance_score: u8,
}

impl DiaryEntry {
    /// Whether the entry can still be seen at `now`.
    #[must_use]
    pub fn is_visible(&self, now: Timestamp) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }
}

/// Importance from kind, length and emotional weight, clamped to 0..=100.
#[must_use]
pub fn importance(kind: EntryKind, content: &str, emotional_context: &str) -> u8 {
    let length_bonus = u8::try_from((content.chars().count() / 20).min(30)).unwrap_or(30);
    let emotion_bonus = match emotional_context.to_ascii_lowercase().as_str() {
        "" | "neutral" => 0,
        "fear" | "grief" | "dread" => 25,
        _ => 10,
    };
    kind.base_importance()
        .saturating_add(length_bonus)
        .saturating_add(emotion_bonus)
        .min(100)
}

/// All diary entries for this visitor, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diary {
    entries: Vec<DiaryEntry>,
}

impl Collection for Diary {
    const KEY: &'static str = "veil.diary";
}

impl Diary {
    /// Append an entry. Ephemeral entries expire after the configured window.
    pub fn create(
        &mut self,
        content: impl Into<String>,
        kind: EntryKind,
        emotional_context: impl Into<String>,
        is_ephemeral: bool,
        now: Timestamp,
        config: &DiaryConfig,
    ) -> &DiaryEntry {
        let content = content.into();
        let emotional_context = emotional_context.into();
        let entry = DiaryEntry {
            id: EntryId::new(),
            importance_score: importance(kind, &content, &emotional_context),
            content,
            kind,
            emotional_context,
            is_ephemeral,
            created_at: now,
            expires_at: is_ephemeral.then(|| now.plus_millis(config.ephemeral_window_ms)),
        };
        debug!(entry = %entry.id, ephemeral = is_ephemeral, "Diary entry created");
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Entries visible at `now`, newest first.
    #[must_use]
    pub fn list_visible(&self, now: Timestamp) -> Vec<&DiaryEntry> {
        let mut visible: Vec<&DiaryEntry> =
            self.entries.iter().filter(|e| e.is_visible(now)).collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        visible
    }

    /// Look an entry up by id, regardless of expiry.
    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<&DiaryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Total stored entries, expired included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was ever written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn ephemeral_entry_expires_at_window_edge() {
        let cfg = DiaryConfig {
            ephemeral_window_ms: 1_000,
        };
        let mut diary = Diary::default();
        diary.create("gone soon", EntryKind::Dream, "dread", true, t(5_000), &cfg);

        assert_eq!(diary.list_visible(t(5_999)).len(), 1);
        assert!(diary.list_visible(t(6_000)).is_empty());
        assert_eq!(diary.len(), 1);
    }

    #[test]
    fn permanent_entries_never_expire() {
        let cfg = DiaryConfig::default();
        let mut diary = Diary::default();
        let id = diary.create("stays", EntryKind::Note, "", false, t(0), &cfg).id;
        assert!(diary.get(id).expect("entry").expires_at.is_none());
        assert_eq!(diary.list_visible(t(i64::MAX)).len(), 1);
    }

    #[test]
    fn newest_first() {
        let cfg = DiaryConfig::default();
        let mut diary = Diary::default();
        diary.create("first", EntryKind::Note, "", false, t(1), &cfg);
        diary.create("second", EntryKind::Note, "", false, t(2), &cfg);
        let list = diary.list_visible(t(3));
        assert_eq!(list[0].content, "second");
        assert_eq!(list[1].content, "first");
    }

    #[test]
    fn importance_is_bounded() {
        let long = "x".repeat(10_000);
        assert_eq!(importance(EntryKind::Confession, &long, "grief"), 100);
        assert_eq!(importance(EntryKind::System, "", ""), 10);
        assert!(importance(EntryKind::Memory, "short", "fear") > importance(EntryKind::Memory, "short", ""));
    }
}
