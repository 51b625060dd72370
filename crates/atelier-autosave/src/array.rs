//! Array-valued fields
//!
//! The store cannot patch one array index, so every item edit rewrites the
//! whole array. [`ArrayField`] is the live accessor shared by all item savers
//! of one field: it holds the in-memory array with every sibling's latest
//! local edit, and serializes the field's whole-array writes.
//!
//! Policy: edits are applied to the shared array as they happen, and each
//! write snapshots the array at write time. A write from item A therefore
//! includes item B's latest edit even if B's own debounce has not fired yet.
//! B's later write then rewrites the same content, which is harmless.
//!
//! Item savers follow their element, not its position: every element gets
//! a slot id when it enters the array, so `remove` of an earlier element
//! shifts the saver along with it. A saver whose element was removed (or
//! replaced wholesale) fails with `ItemRemoved` instead of writing.

use crate::adapter::{PartialUpdate, PersistenceAdapter};
use crate::error::SaveError;
use crate::saver::{Autosave, FieldValue, SaverCore, WriteTarget};
use crate::types::{AutosaveConfig, FieldBinding, SaveSnapshot, SaveStatus};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

struct ArrayInner {
    adapter: Arc<dyn PersistenceAdapter>,
    binding: FieldBinding,
    updated_by: Option<String>,
    items: RwLock<Items>,
    write_gate: tokio::sync::Mutex<()>,
}

/// Array elements with a stable slot id each
struct Items {
    values: Vec<Value>,
    slots: Vec<u64>,
    next_slot: u64,
}

impl Items {
    fn new(values: Vec<Value>) -> Self {
        let mut items = Self {
            values: Vec::new(),
            slots: Vec::new(),
            next_slot: 0,
        };
        items.replace(values);
        items
    }

    fn push(&mut self, value: Value) {
        self.slots.push(self.next_slot);
        self.next_slot += 1;
        self.values.push(value);
    }

    fn remove(&mut self, index: usize) -> Option<Value> {
        if index >= self.values.len() {
            return None;
        }
        self.slots.remove(index);
        Some(self.values.remove(index))
    }

    fn replace(&mut self, values: Vec<Value>) {
        self.values.clear();
        self.slots.clear();
        for value in values {
            self.push(value);
        }
    }

    fn position(&self, slot: u64) -> Option<usize> {
        self.slots.iter().position(|&s| s == slot)
    }
}

/// Live, shared view of one array-valued field
#[derive(Clone)]
pub struct ArrayField {
    inner: Arc<ArrayInner>,
}

impl ArrayField {
    /// Wrap the array as loaded from the store
    #[must_use]
    pub fn new(
        adapter: Arc<dyn PersistenceAdapter>,
        binding: FieldBinding,
        items: Vec<Value>,
        config: &AutosaveConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                adapter,
                binding,
                updated_by: config.updated_by.clone(),
                items: RwLock::new(Items::new(items)),
                write_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Current local state of the whole array
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.items.read().values.clone()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.read().values.get(index).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.read().values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.read().values.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn binding(&self) -> &FieldBinding {
        &self.inner.binding
    }

    /// Append an item locally; call [`persist`](Self::persist) to save
    pub fn push(&self, item: Value) {
        self.inner.items.write().push(item);
    }

    /// Remove an item locally; call [`persist`](Self::persist) to save
    ///
    /// Savers of later items move down with their elements.
    pub fn remove(&self, index: usize) -> Option<Value> {
        self.inner.items.write().remove(index)
    }

    /// Replace the whole local array, e.g. after reordering
    ///
    /// Existing item savers lose their elements and fail on their next write.
    pub fn replace(&self, items: Vec<Value>) {
        self.inner.items.write().replace(items);
    }

    /// Apply an item edit to the local array without writing
    ///
    /// # Errors
    /// - `SaveError::ItemRemoved` if `index` is out of range
    /// - `SaveError::NotAnObject` if `sub_key` is set on a non-object item
    pub fn set_local(&self, index: usize, sub_key: Option<&str>, value: Value) -> Result<(), SaveError> {
        let mut items = self.inner.items.write();
        patch(&mut items.values, index, sub_key, value)
    }

    /// Write the whole local array
    ///
    /// For structural changes (`push`, `remove`, `replace`) that no item
    /// saver owns.
    ///
    /// # Errors
    /// Returns the adapter failure; nothing is retained.
    pub async fn persist(&self) -> Result<(), SaveError> {
        let _gate = self.inner.write_gate.lock().await;
        let items = self.snapshot();
        self.write_all(items).await
    }

    /// Bind a saver to one item, or one key of one object item
    #[must_use]
    pub fn item_saver<T: FieldValue>(
        &self,
        index: usize,
        sub_key: Option<&str>,
        baseline: T,
        config: &AutosaveConfig,
    ) -> ArrayItemSaver<T> {
        let item = ItemRef {
            slot: self.inner.items.read().slots.get(index).copied(),
            bound_index: index,
        };
        let target = ArrayItemTarget {
            field: self.clone(),
            item,
            sub_key: sub_key.map(str::to_string),
        };
        tracing::debug!(field = %target.describe(), "binding array item saver");
        ArrayItemSaver {
            core: SaverCore::new(Box::new(target), baseline, config.debounce()),
            field: self.clone(),
            item,
            sub_key: sub_key.map(str::to_string),
        }
    }

    fn set_item(&self, item: ItemRef, sub_key: Option<&str>, value: Value) -> Result<(), SaveError> {
        let mut items = self.inner.items.write();
        patch_item(&mut items, item, sub_key, value)
    }

    async fn write_item(&self, item: ItemRef, sub_key: Option<&str>, value: Value) -> Result<(), SaveError> {
        let _gate = self.inner.write_gate.lock().await;
        let values = {
            let mut items = self.inner.items.write();
            patch_item(&mut items, item, sub_key, value)?;
            items.values.clone()
        };
        self.write_all(values).await
    }

    async fn write_all(&self, items: Vec<Value>) -> Result<(), SaveError> {
        let Some(document) = self.inner.binding.document() else {
            return Ok(());
        };
        let update = PartialUpdate::field(self.inner.binding.path.clone(), Value::Array(items))
            .with_updated_by(self.inner.updated_by.clone());
        self.inner.adapter.partial_update(&document, update).await?;
        Ok(())
    }
}

/// Element an item saver was bound to
#[derive(Debug, Clone, Copy)]
struct ItemRef {
    /// `None` if the index was out of range at bind time
    slot: Option<u64>,
    bound_index: usize,
}

fn patch_item(items: &mut Items, item: ItemRef, sub_key: Option<&str>, value: Value) -> Result<(), SaveError> {
    let index = item
        .slot
        .and_then(|slot| items.position(slot))
        .ok_or(SaveError::ItemRemoved {
            index: item.bound_index,
            len: items.values.len(),
        })?;
    patch(&mut items.values, index, sub_key, value)
}

fn patch(items: &mut [Value], index: usize, sub_key: Option<&str>, value: Value) -> Result<(), SaveError> {
    let len = items.len();
    let item = items
        .get_mut(index)
        .ok_or(SaveError::ItemRemoved { index, len })?;
    match sub_key {
        None => *item = value,
        Some(key) => {
            let object = item
                .as_object_mut()
                .ok_or(SaveError::NotAnObject { index })?;
            object.insert(key.to_string(), value);
        }
    }
    Ok(())
}

struct ArrayItemTarget {
    field: ArrayField,
    item: ItemRef,
    sub_key: Option<String>,
}

#[async_trait::async_trait]
impl WriteTarget for ArrayItemTarget {
    fn is_bound(&self) -> bool {
        self.field.inner.binding.doc_id.is_some()
    }

    fn describe(&self) -> String {
        let binding = &self.field.inner.binding;
        let mut label = format!(
            "{}/{}:{}[{}]",
            binding.collection,
            binding.doc_id.as_deref().unwrap_or("-"),
            binding.path,
            self.item.bound_index
        );
        if let Some(key) = &self.sub_key {
            label.push('.');
            label.push_str(key);
        }
        label
    }

    async fn write(&self, value: Value) -> Result<(), SaveError> {
        self.field
            .write_item(self.item, self.sub_key.as_deref(), value)
            .await
    }
}

/// Debounced autosave for one element of an array field
///
/// Same state machine as [`FieldSaver`](crate::FieldSaver); the write step
/// rewrites the whole array through the shared [`ArrayField`].
pub struct ArrayItemSaver<T: FieldValue> {
    core: Arc<SaverCore<T>>,
    field: ArrayField,
    item: ItemRef,
    sub_key: Option<String>,
}

impl<T: FieldValue> ArrayItemSaver<T> {
    /// Record a new value for the item
    ///
    /// The shared array sees the edit immediately; the write is debounced.
    pub fn set_value(&self, value: T) {
        match serde_json::to_value(&value) {
            Ok(encoded) => {
                if let Err(err) = self.field.set_item(self.item, self.sub_key.as_deref(), encoded) {
                    tracing::debug!(index = self.item.bound_index, error = %err, "local array edit not applied");
                }
            }
            Err(err) => tracing::debug!(index = self.item.bound_index, error = %err, "item value not encodable"),
        }
        self.core.set_value(value);
    }

    pub async fn flush(&self) -> SaveStatus {
        self.core.flush().await
    }

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

    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SaveSnapshot> {
        self.core.subscribe()
    }

    #[must_use]
    pub fn value(&self) -> T {
        self.core.current()
    }

    /// Current position of the element, `None` once it was removed
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        let slot = self.item.slot?;
        self.field.inner.items.read().position(slot)
    }

    #[inline]
    #[must_use]
    pub fn sub_key(&self) -> Option<&str> {
        self.sub_key.as_deref()
    }
}

impl<T: FieldValue> Drop for ArrayItemSaver<T> {
    fn drop(&mut self) {
        self.core.unmount();
    }
}

#[async_trait::async_trait]
impl<T: FieldValue> Autosave for ArrayItemSaver<T> {
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
