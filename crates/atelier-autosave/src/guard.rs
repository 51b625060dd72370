//! Unsaved-changes guard
//!
//! Aggregates the savers of one page and decides whether leaving it should
//! ask for confirmation. A field in `dirty` or `saving` means an edit could
//! be lost; `error` alone does not trigger the warning.

use crate::saver::Autosave;
use crate::types::{SaveSnapshot, SaveStatus};
use tokio::sync::watch;

/// Prompt shown when the guard is active
pub const DEFAULT_WARNING: &str =
    "You have unsaved changes. Are you sure you want to leave this page?";

/// Whether any status could still lose an edit
#[must_use]
pub fn has_unsaved(statuses: &[SaveStatus]) -> bool {
    statuses.iter().any(|s| s.is_unsaved())
}

/// Tracks the savers of one page
#[derive(Debug)]
pub struct UnsavedChangesGuard {
    tracked: Vec<watch::Receiver<SaveSnapshot>>,
    message: String,
}

impl UnsavedChangesGuard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracked: Vec::new(),
            message: DEFAULT_WARNING.to_string(),
        }
    }

    /// With custom prompt text
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Track a saver for as long as it is alive
    pub fn track(&mut self, saver: &dyn Autosave) {
        self.tracked.push(saver.subscribe());
    }

    /// Track a raw status channel
    pub fn track_receiver(&mut self, receiver: watch::Receiver<SaveSnapshot>) {
        self.tracked.push(receiver);
    }

    /// Statuses of every saver still bound
    ///
    /// Savers that have been dropped (and finished any in-flight write) are
    /// forgotten.
    pub fn statuses(&mut self) -> Vec<SaveStatus> {
        self.tracked.retain(|rx| rx.has_changed().is_ok());
        self.tracked.iter().map(|rx| rx.borrow().status).collect()
    }

    /// Number of savers still tracked
    pub fn len(&mut self) -> usize {
        self.statuses().len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Whether leaving now should warn
    pub fn should_warn(&mut self) -> bool {
        has_unsaved(&self.statuses())
    }

    /// Prompt text if leaving now should warn
    pub fn warning(&mut self) -> Option<&str> {
        if self.should_warn() {
            Some(&self.message)
        } else {
            None
        }
    }
}

impl Default for UnsavedChangesGuard {
    fn default() -> Self {
        Self::new()
    }
}
