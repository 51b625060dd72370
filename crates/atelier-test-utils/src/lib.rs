//! Testing utilities for the atelier workspace
//!
//! Shared fixtures: a recording adapter with failure injection and write
//! latency, and site-content document builders.

#![allow(missing_docs)]

use atelier_autosave::{
    AdapterError, AutosaveConfig, DocumentRef, FieldBinding, FieldPath, MemoryStore, PartialUpdate,
    PersistenceAdapter,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub const SITE_COLLECTION: &str = "siteContent";
pub const SITE_DOC: &str = "main";

pub fn site_doc() -> DocumentRef {
    DocumentRef::new(SITE_COLLECTION, SITE_DOC)
}

pub fn site_binding(path: &str) -> FieldBinding {
    FieldBinding::new(SITE_COLLECTION, SITE_DOC, path.parse::<FieldPath>().unwrap())
}

/// Site content as seeded on a fresh install
pub fn seeded_site_content() -> Value {
    json!({
        "heroHeadline": "Hello",
        "heroSubheadline": "Latex couture",
        "introText": "Welkom in het atelier",
        "contact": {"email": "iris@example.com", "phone": "000"},
        "atelierHighlights": ["Handwerk", "Maatwerk"],
        "werkwijzeSteps": [
            {"id": "1", "title": "A", "description": "Kennismaking", "order": 1},
            {"id": "2", "title": "B", "description": "Ontwerp", "order": 2}
        ]
    })
}

/// One recorded write
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub document: DocumentRef,
    pub update: PartialUpdate,
}

impl RecordedWrite {
    /// Value written to `path`
    pub fn value(&self, path: &str) -> Option<&Value> {
        self.update.value_of(&path.parse().unwrap())
    }
}

/// Adapter that records every write and forwards it to a [`MemoryStore`]
///
/// Failed attempts are recorded too, so tests can inspect what a retry sent.
pub struct RecordingAdapter {
    store: Arc<MemoryStore>,
    writes: Mutex<Vec<RecordedWrite>>,
    failures: Mutex<VecDeque<AdapterError>>,
    fail_all: Mutex<Option<AdapterError>>,
    latency: Mutex<Duration>,
}

impl RecordingAdapter {
    pub fn new(store: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            writes: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            fail_all: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
        })
    }

    /// Adapter over a store seeded with [`seeded_site_content`]
    pub fn seeded() -> Arc<Self> {
        let store = Arc::new(MemoryStore::new());
        store.insert(site_doc(), seeded_site_content());
        Self::new(store)
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn as_adapter(self: &Arc<Self>) -> Arc<dyn PersistenceAdapter> {
        Arc::clone(self) as Arc<dyn PersistenceAdapter>
    }

    /// Fail the next write with `error`
    pub fn fail_next(&self, error: AdapterError) {
        self.failures.lock().push_back(error);
    }

    /// Fail every write until cleared with `None`
    pub fn fail_all(&self, error: Option<AdapterError>) {
        *self.fail_all.lock() = error;
    }

    /// Delay every write by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    /// Values written to `path`, in order
    pub fn values_for(&self, path: &str) -> Vec<Value> {
        self.writes
            .lock()
            .iter()
            .filter_map(|w| w.value(path).cloned())
            .collect()
    }

    /// Stored value at `path` of the site document
    pub fn stored(&self, path: &str) -> Option<Value> {
        self.store.get_field(&site_doc(), &path.parse().unwrap())
    }
}

#[async_trait::async_trait]
impl PersistenceAdapter for RecordingAdapter {
    async fn partial_update(
        &self,
        document: &DocumentRef,
        update: PartialUpdate,
    ) -> Result<(), AdapterError> {
        self.writes.lock().push(RecordedWrite {
            document: document.clone(),
            update: update.clone(),
        });

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let injected = self.failures.lock().pop_front();
        if let Some(error) = injected.or_else(|| self.fail_all.lock().clone()) {
            return Err(error);
        }
        self.store.partial_update(document, update).await
    }
}

/// Config with the default intervals
pub fn test_config() -> AutosaveConfig {
    AutosaveConfig::new()
}

/// Let spawned timer and write tasks run on a paused clock
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
