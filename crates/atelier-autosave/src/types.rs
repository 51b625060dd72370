//! Core types for the autosave subsystem
//!
//! Defines:
//! - Save status and the snapshot savers publish
//! - Document and field bindings
//! - Autosave configuration

use crate::error::{ConfigError, SaveError};
use crate::path::FieldPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Save state of one field binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    /// Value matches the last saved value, nothing pending
    #[default]
    Idle,
    /// Value changed, debounce timer running
    Dirty,
    /// Write in flight
    Saving,
    /// Last write succeeded
    Saved,
    /// Last write failed
    Error,
}

impl SaveStatus {
    /// Whether leaving the page now could lose an edit
    #[inline]
    #[must_use]
    pub fn is_unsaved(self) -> bool {
        matches!(self, Self::Dirty | Self::Saving)
    }

    /// Lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dirty => "dirty",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of a saver
#[derive(Debug, Clone, Default)]
pub struct SaveSnapshot {
    /// Current status
    pub status: SaveStatus,
    /// Time of the last successful write
    pub last_saved: Option<DateTime<Utc>>,
    /// Error retained from the last failed write
    pub error: Option<Arc<SaveError>>,
}

/// One document in the content store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Collection path
    pub collection: String,
    /// Document id
    pub id: String,
}

impl DocumentRef {
    #[inline]
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Association between one editable input and one document field
///
/// A binding without a document id never writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    /// Collection path
    pub collection: String,
    /// Document id, `None` until the document exists
    pub doc_id: Option<String>,
    /// Field or dotted nested path
    pub path: FieldPath,
}

impl FieldBinding {
    /// Bind a field of an existing document
    #[inline]
    #[must_use]
    pub fn new(collection: impl Into<String>, doc_id: impl Into<String>, path: FieldPath) -> Self {
        Self {
            collection: collection.into(),
            doc_id: Some(doc_id.into()),
            path,
        }
    }

    /// Bind a field of a document that does not exist yet
    #[inline]
    #[must_use]
    pub fn pending(collection: impl Into<String>, path: FieldPath) -> Self {
        Self {
            collection: collection.into(),
            doc_id: None,
            path,
        }
    }

    /// Target document, if known
    #[must_use]
    pub fn document(&self) -> Option<DocumentRef> {
        self.doc_id
            .as_ref()
            .map(|id| DocumentRef::new(self.collection.clone(), id.clone()))
    }
}

/// Autosave configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Debounce for ordinary text fields
    pub debounce_ms: u64,
    /// Debounce for large rich-text fields
    pub long_text_debounce_ms: u64,
    /// How long the saved indicator stays visible
    pub auto_fade_ms: u64,
    /// Editor id stamped on every write
    pub updated_by: Option<String>,
    /// Show `HH:MM` instead of a label once saved
    pub show_timestamp: bool,
}

impl AutosaveConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With debounce interval
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = duration_ms(debounce);
        self
    }

    /// With debounce for long text fields
    #[inline]
    #[must_use]
    pub fn with_long_text_debounce(mut self, debounce: Duration) -> Self {
        self.long_text_debounce_ms = duration_ms(debounce);
        self
    }

    /// With saved-indicator fade delay
    #[inline]
    #[must_use]
    pub fn with_auto_fade(mut self, fade: Duration) -> Self {
        self.auto_fade_ms = duration_ms(fade);
        self
    }

    /// With editor id
    #[inline]
    #[must_use]
    pub fn with_updated_by(mut self, user: impl Into<String>) -> Self {
        self.updated_by = Some(user.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[inline]
    #[must_use]
    pub fn long_text_debounce(&self) -> Duration {
        Duration::from_millis(self.long_text_debounce_ms)
    }

    #[inline]
    #[must_use]
    pub fn auto_fade(&self) -> Duration {
        Duration::from_millis(self.auto_fade_ms)
    }

    /// Same config with the long-text debounce as the active debounce
    #[must_use]
    pub fn for_long_text(&self) -> Self {
        Self {
            debounce_ms: self.long_text_debounce_ms,
            ..self.clone()
        }
    }

    /// Reject zero intervals
    ///
    /// # Errors
    /// - `ConfigError::ZeroDuration` if any interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroDuration("debounce_ms"));
        }
        if self.long_text_debounce_ms == 0 {
            return Err(ConfigError::ZeroDuration("long_text_debounce_ms"));
        }
        if self.auto_fade_ms == 0 {
            return Err(ConfigError::ZeroDuration("auto_fade_ms"));
        }
        Ok(())
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1500,
            long_text_debounce_ms: 2000,
            auto_fade_ms: 2000,
            updated_by: None,
            show_timestamp: false,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
