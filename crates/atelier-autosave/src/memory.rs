//! In-memory content store
//!
//! A [`PersistenceAdapter`] backed by a concurrent map of JSON documents,
//! with the read primitives (`get`, `subscribe`) the admin pages use to
//! load content. Used by the CLI and by tests in place of the hosted store.

use crate::adapter::{PartialUpdate, PersistenceAdapter, UPDATED_AT_FIELD, UPDATED_BY_FIELD};
use crate::error::AdapterError;
use crate::path::FieldPath;
use crate::types::DocumentRef;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Notification sent after a document changed
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    /// Changed document
    pub document: DocumentRef,
    /// Fields written, empty when the whole document was replaced
    pub paths: Vec<FieldPath>,
}

/// Concurrent in-memory document store
#[derive(Debug)]
pub struct MemoryStore {
    documents: DashMap<DocumentRef, Value>,
    changes: broadcast::Sender<DocumentChange>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            documents: DashMap::new(),
            changes,
        }
    }

    /// Set a whole document, replacing any existing one
    pub fn insert(&self, document: DocumentRef, data: Value) {
        self.documents.insert(document.clone(), data);
        let _ = self.changes.send(DocumentChange {
            document,
            paths: Vec::new(),
        });
    }

    /// Current contents of a document
    #[must_use]
    pub fn get(&self, document: &DocumentRef) -> Option<Value> {
        self.documents.get(document).map(|entry| entry.value().clone())
    }

    /// Value at `path` inside a document
    #[must_use]
    pub fn get_field(&self, document: &DocumentRef, path: &FieldPath) -> Option<Value> {
        let entry = self.documents.get(document)?;
        let mut current = entry.value();
        for segment in path.segments() {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Receive a [`DocumentChange`] for every write from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }

    /// Number of stored documents
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn apply(&self, document: &DocumentRef, update: &PartialUpdate) -> Result<(), AdapterError> {
        let mut entry = self
            .documents
            .get_mut(document)
            .ok_or_else(|| AdapterError::NotFound {
                collection: document.collection.clone(),
                id: document.id.clone(),
            })?;

        // Validate every path before touching the document so a rejected
        // update leaves it unchanged.
        let mut staged = entry.value().clone();
        for (path, value) in &update.fields {
            set_path(&mut staged, path, value.clone())?;
        }
        let root = as_object(&mut staged, "document root")?;
        root.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        if let Some(user) = &update.updated_by {
            root.insert(UPDATED_BY_FIELD.to_string(), Value::String(user.clone()));
        }
        *entry.value_mut() = staged;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn partial_update(
        &self,
        document: &DocumentRef,
        update: PartialUpdate,
    ) -> Result<(), AdapterError> {
        self.apply(document, &update)?;
        let _ = self.changes.send(DocumentChange {
            document: document.clone(),
            paths: update.fields.into_iter().map(|(path, _)| path).collect(),
        });
        Ok(())
    }
}

fn as_object<'a>(value: &'a mut Value, at: &str) -> Result<&'a mut Map<String, Value>, AdapterError> {
    value
        .as_object_mut()
        .ok_or_else(|| AdapterError::InvalidPath(format!("{at} is not an object")))
}

fn set_path(root: &mut Value, path: &FieldPath, value: Value) -> Result<(), AdapterError> {
    let (last, parents) = path
        .segments()
        .split_last()
        .ok_or_else(|| AdapterError::InvalidPath(path.dotted()))?;

    let mut current = as_object(root, "document root")?;
    for segment in parents {
        let child = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        current = as_object(child, segment)?;
    }
    current.insert(last.clone(), value);
    Ok(())
}
