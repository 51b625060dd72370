//! Per-field autosave
//!
//! A [`FieldSaver`] persists one field of one document. Every edit goes
//! through [`FieldSaver::set_value`]; the saver debounces, writes a partial
//! update through the injected [`PersistenceAdapter`] and publishes its
//! [`SaveSnapshot`]. Write failures end up in the snapshot, never in the
//! caller's control flow, so one failing field cannot block the others.
//!
//! # Example
//!
//! ```rust,ignore
//! let saver = FieldSaver::bind(store, binding, "Hello".to_string(), &config);
//! saver.set_value("Hello world".to_string());
//! // ... 1.5s later the store holds "Hello world"
//! ```

use crate::adapter::{PartialUpdate, PersistenceAdapter};
use crate::error::SaveError;
use crate::saver::{Autosave, FieldValue, SaverCore, WriteTarget};
use crate::types::{AutosaveConfig, FieldBinding, SaveSnapshot, SaveStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

struct FieldTarget {
    adapter: Arc<dyn PersistenceAdapter>,
    binding: FieldBinding,
    updated_by: Option<String>,
}

#[async_trait::async_trait]
impl WriteTarget for FieldTarget {
    fn is_bound(&self) -> bool {
        self.binding.doc_id.is_some()
    }

    fn describe(&self) -> String {
        format!(
            "{}/{}:{}",
            self.binding.collection,
            self.binding.doc_id.as_deref().unwrap_or("-"),
            self.binding.path
        )
    }

    async fn write(&self, value: Value) -> Result<(), SaveError> {
        let Some(document) = self.binding.document() else {
            return Ok(());
        };
        let update = PartialUpdate::field(self.binding.path.clone(), value)
            .with_updated_by(self.updated_by.clone());
        self.adapter.partial_update(&document, update).await?;
        Ok(())
    }
}

/// Debounced autosave for one field
///
/// Dropping the saver is the unmount: a pending debounce is cancelled, a
/// write already in flight completes unobserved.
pub struct FieldSaver<T: FieldValue> {
    core: Arc<SaverCore<T>>,
    binding: FieldBinding,
}

impl<T: FieldValue> FieldSaver<T> {
    /// Bind a saver to a field whose stored value is `baseline`
    ///
    /// Binding never writes; only later changes are persisted.
    ///
    /// # Panics
    /// Later calls to [`set_value`](Self::set_value) spawn timers and must
    /// run inside a Tokio runtime.
    #[must_use]
    pub fn bind(
        adapter: Arc<dyn PersistenceAdapter>,
        binding: FieldBinding,
        baseline: T,
        config: &AutosaveConfig,
    ) -> Self {
        let target = FieldTarget {
            adapter,
            binding: binding.clone(),
            updated_by: config.updated_by.clone(),
        };
        tracing::debug!(field = %target.describe(), "binding field saver");
        Self {
            core: SaverCore::new(Box::new(target), baseline, config.debounce()),
            binding,
        }
    }

    /// Record a new value for the field
    pub fn set_value(&self, value: T) {
        self.core.set_value(value);
    }

    /// Write the current value now, cancelling any pending debounce
    pub async fn flush(&self) -> SaveStatus {
        self.core.flush().await
    }

    /// Re-attempt the failed write with the value that failed
    ///
    /// Does nothing unless the saver is in the `error` state.
    pub async fn retry(&self) -> SaveStatus {
        self.core.retry().await
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.core.status()
    }

    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> SaveSnapshot {
        self.core.snapshot()
    }

    /// Follow status changes
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SaveSnapshot> {
        self.core.subscribe()
    }

    #[must_use]
    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.core.snapshot().last_saved
    }

    #[must_use]
    pub fn error(&self) -> Option<Arc<SaveError>> {
        self.core.snapshot().error
    }

    /// Value most recently passed to `set_value`
    #[must_use]
    pub fn value(&self) -> T {
        self.core.current()
    }

    /// Last value written successfully (or the bind-time baseline)
    #[must_use]
    pub fn saved_value(&self) -> T {
        self.core.baseline()
    }

    /// Whether the current value differs from the saved one
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.core.current() != self.core.baseline()
    }

    #[inline]
    #[must_use]
    pub fn binding(&self) -> &FieldBinding {
        &self.binding
    }
}

impl<T: FieldValue> Drop for FieldSaver<T> {
    fn drop(&mut self) {
        self.core.unmount();
    }
}

#[async_trait::async_trait]
impl<T: FieldValue> Autosave for FieldSaver<T> {
    fn status(&self) -> SaveStatus {
        self.core.status()
    }

    fn subscribe(&self) -> watch::Receiver<SaveSnapshot> {
        self.core.subscribe()
    }

    async fn flush(&self) -> SaveStatus {
        self.core.flush().await
    }

    async fn retry(&self) -> SaveStatus {
        self.core.retry().await
    }
}

/// Compare two values by their encoded form
///
/// For fields saved manually rather than through a [`FieldSaver`].
#[must_use]
pub fn is_dirty<T: Serialize>(initial: &T, current: &T) -> bool {
    match (serde_json::to_value(initial), serde_json::to_value(current)) {
        (Ok(a), Ok(b)) => a != b,
        _ => true,
    }
}
