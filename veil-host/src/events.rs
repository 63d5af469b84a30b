//! User actions reported by the renderer.

use serde::{Deserialize, Serialize};
use veil_core::narrative::Page;

/// Something the visitor did.
///
/// Renderers post these as `{"type": "page_visit", "value": "campfire"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UserAction {
    /// Opened a page, by route slug.
    PageVisit(String),
    /// Typed a console command.
    ConsoleCommand(String),
    /// Entered a book code.
    BookCode(String),
    /// Found a layered clue.
    Clue(String),
    /// Wrote their legacy.
    LegacyWritten,
    /// Any click or keypress; resets the idle timer.
    Click,
    /// The renderer measured how long the visitor has been idle.
    Idle {
        /// Milliseconds since the last interaction.
        idle_ms: i64,
    },
}

impl UserAction {
    /// Whether this action changes persisted history.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Self::Click | Self::Idle { .. })
    }
}

/// Normalised event-counter key for a page slug.
#[must_use]
pub fn page_key(slug: &str) -> String {
    let slug = slug.trim_matches('/').to_ascii_lowercase();
    if slug.is_empty() {
        Page::Gate.to_string()
    } else {
        slug
    }
}
