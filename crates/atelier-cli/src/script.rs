//! Edit scripts
//!
//! A script seeds one document and replays editor actions against savers
//! bound to its fields:
//!
//! ```json
//! {
//!   "collection": "siteContent",
//!   "id": "main",
//!   "document": { "heroHeadline": "Hello", "steps": [{ "title": "A" }] },
//!   "steps": [
//!     { "op": "set", "path": "heroHeadline", "value": "Hi" },
//!     { "op": "set", "path": "steps", "index": 0, "key": "title", "value": "A2" },
//!     { "op": "fail", "error": "unavailable" },
//!     { "op": "wait", "ms": 2000 },
//!     { "op": "retry", "path": "heroHeadline" }
//!   ]
//! }
//! ```

use anyhow::{bail, Context, Result};
use atelier_autosave::{
    AdapterError, ArrayField, ArrayItemSaver, Autosave, AutosaveConfig, DocumentRef, FieldBinding,
    FieldPath, FieldSaver, MemoryStore, PartialUpdate, PersistenceAdapter, SaveSnapshot,
    UnsavedChangesGuard,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub(crate) struct Script {
    pub(crate) collection: String,
    pub(crate) id: String,
    #[serde(default = "empty_document")]
    pub(crate) document: Value,
    pub(crate) steps: Vec<Step>,
}

fn empty_document() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Step {
    /// Editor changed a field, or one item of an array field
    Set {
        path: String,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        key: Option<String>,
        value: Value,
    },
    /// Let time pass
    Wait { ms: u64 },
    /// Write the field now
    Flush {
        path: String,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        key: Option<String>,
    },
    /// Press retry on the field's error indicator
    Retry {
        path: String,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        key: Option<String>,
    },
    /// Make the next write fail
    Fail {
        error: FailureKind,
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum FailureKind {
    Unavailable,
    PermissionDenied,
    Rejected,
}

impl FailureKind {
    fn into_error(self, message: Option<String>) -> AdapterError {
        let message = message.unwrap_or_else(|| "injected by script".to_string());
        match self {
            Self::Unavailable => AdapterError::Unavailable(message),
            Self::PermissionDenied => AdapterError::PermissionDenied(message),
            Self::Rejected => AdapterError::Rejected(message),
        }
    }
}

/// Store adapter with scripted failures
struct ScriptedAdapter {
    store: Arc<MemoryStore>,
    failures: Mutex<VecDeque<AdapterError>>,
}

#[async_trait::async_trait]
impl PersistenceAdapter for ScriptedAdapter {
    async fn partial_update(
        &self,
        document: &DocumentRef,
        update: PartialUpdate,
    ) -> Result<(), AdapterError> {
        let injected = self.failures.lock().pop_front();
        if let Some(error) = injected {
            tracing::debug!(%document, error = %error, "failing scripted write");
            return Err(error);
        }
        self.store.partial_update(document, update).await
    }
}

/// Saver of one scripted field
enum Bound {
    Field(FieldSaver<Value>),
    Item(ArrayItemSaver<Value>),
}

impl Bound {
    fn set(&self, value: Value) {
        match self {
            Self::Field(saver) => saver.set_value(value),
            Self::Item(saver) => saver.set_value(value),
        }
    }

    fn as_autosave(&self) -> &dyn Autosave {
        match self {
            Self::Field(saver) => saver,
            Self::Item(saver) => saver,
        }
    }
}

/// Final state after a replay
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) document: Value,
    pub(crate) fields: BTreeMap<String, SaveSnapshot>,
    pub(crate) unsaved: bool,
}

impl Outcome {
    pub(crate) fn to_json(&self) -> Value {
        let fields: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, snapshot)| {
                let entry = json!({
                    "status": snapshot.status,
                    "last_saved": snapshot.last_saved,
                    "error": snapshot.error.as_ref().map(ToString::to_string),
                });
                (name.clone(), entry)
            })
            .collect();
        json!({
            "document": self.document,
            "fields": fields,
            "unsaved": self.unsaved,
        })
    }
}

struct Replay {
    document: DocumentRef,
    store: Arc<MemoryStore>,
    adapter: Arc<ScriptedAdapter>,
    config: AutosaveConfig,
    arrays: BTreeMap<String, ArrayField>,
    savers: BTreeMap<String, Bound>,
    guard: UnsavedChangesGuard,
}

impl Replay {
    fn new(script: &Script, config: AutosaveConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let document = DocumentRef::new(script.collection.clone(), script.id.clone());
        store.insert(document.clone(), script.document.clone());
        let adapter = Arc::new(ScriptedAdapter {
            store: Arc::clone(&store),
            failures: Mutex::new(VecDeque::new()),
        });
        Self {
            document,
            store,
            adapter,
            config,
            arrays: BTreeMap::new(),
            savers: BTreeMap::new(),
            guard: UnsavedChangesGuard::new(),
        }
    }

    fn binding(&self, path: FieldPath) -> FieldBinding {
        FieldBinding::new(self.document.collection.clone(), self.document.id.clone(), path)
    }

    /// Saver for a field, bound on first use with the stored value as baseline
    fn saver(&mut self, path: &str, index: Option<usize>, key: Option<&str>) -> Result<&Bound> {
        let name = saver_name(path, index, key);
        if !self.savers.contains_key(&name) {
            let field_path: FieldPath = path.parse().with_context(|| format!("field `{path}`"))?;
            let bound = match index {
                None => {
                    let baseline = self.store.get_field(&self.document, &field_path).unwrap_or(Value::Null);
                    Bound::Field(FieldSaver::bind(
                        Arc::clone(&self.adapter) as Arc<dyn PersistenceAdapter>,
                        self.binding(field_path),
                        baseline,
                        &self.config,
                    ))
                }
                Some(index) => {
                    let array = self.array(path, field_path)?;
                    let item = array.get(index).with_context(|| {
                        format!("`{path}` has no item {index} (length {})", array.len())
                    })?;
                    let baseline = match key {
                        Some(key) => item.get(key).cloned().unwrap_or(Value::Null),
                        None => item,
                    };
                    Bound::Item(array.item_saver(index, key, baseline, &self.config))
                }
            };
            tracing::debug!(field = %name, "bound saver");
            self.guard.track(bound.as_autosave());
            self.savers.insert(name.clone(), bound);
        }
        self.savers
            .get(&name)
            .with_context(|| format!("saver `{name}` missing"))
    }

    fn array(&mut self, path: &str, field_path: FieldPath) -> Result<ArrayField> {
        if let Some(array) = self.arrays.get(path) {
            return Ok(array.clone());
        }
        let items = match self.store.get_field(&self.document, &field_path) {
            Some(Value::Array(items)) => items,
            Some(_) => bail!("`{path}` is not an array"),
            None => Vec::new(),
        };
        let array = ArrayField::new(
            Arc::clone(&self.adapter) as Arc<dyn PersistenceAdapter>,
            self.binding(field_path),
            items,
            &self.config,
        );
        self.arrays.insert(path.to_string(), array.clone());
        Ok(array)
    }

    async fn step(&mut self, step: Step) -> Result<()> {
        match step {
            Step::Set { path, index, key, value } => {
                self.saver(&path, index, key.as_deref())?.set(value);
            }
            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            Step::Flush { path, index, key } => {
                let status = self.saver(&path, index, key.as_deref())?.as_autosave().flush().await;
                tracing::info!(field = %path, %status, "flushed");
            }
            Step::Retry { path, index, key } => {
                let status = self.saver(&path, index, key.as_deref())?.as_autosave().retry().await;
                tracing::info!(field = %path, %status, "retried");
            }
            Step::Fail { error, message } => {
                self.adapter.failures.lock().push_back(error.into_error(message));
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Outcome> {
        let unsaved = self.guard.should_warn();
        if let Some(warning) = self.guard.warning() {
            tracing::warn!("{warning}");
        }
        let fields = self
            .savers
            .iter()
            .map(|(name, bound)| (name.clone(), bound.as_autosave().subscribe().borrow().clone()))
            .collect();
        let document = self
            .store
            .get(&self.document)
            .with_context(|| format!("document {} vanished", self.document))?;
        Ok(Outcome {
            document,
            fields,
            unsaved,
        })
    }
}

fn saver_name(path: &str, index: Option<usize>, key: Option<&str>) -> String {
    match (index, key) {
        (None, _) => path.to_string(),
        (Some(index), None) => format!("{path}[{index}]"),
        (Some(index), Some(key)) => format!("{path}[{index}].{key}"),
    }
}

/// Replay `script` and collect the final document and field statuses
pub(crate) async fn run(script: Script, config: AutosaveConfig) -> Result<Outcome> {
    if !script.document.is_object() {
        bail!("script document must be a JSON object");
    }
    let mut replay = Replay::new(&script, config);
    for (n, step) in script.steps.into_iter().enumerate() {
        tracing::debug!(step = n, ?step, "replaying");
        replay.step(step).await.with_context(|| format!("step {n}"))?;
    }
    replay.finish()
}
