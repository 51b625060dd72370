//! Debounced save state machine shared by field and array-item savers
//!
//! One [`SaverCore`] owns the save state of one binding:
//!
//! ```text
//! idle ──change──▶ dirty ──debounce/flush──▶ saving ──ok──▶ saved
//!   ▲                │                         │
//!   └──revert────────┘                         └──err──▶ error ──retry──▶ saving
//! ```
//!
//! # Invariants
//!
//! - At most one debounce timer per binding; a new value cancels and
//!   replaces it.
//! - Writes of one binding are serialized. A value arriving while a write is
//!   in flight marks the binding dirty and starts a new debounce; its write
//!   waits for the in-flight one to settle.
//! - A debounced write that reaches the gate re-checks its cycle: it is
//!   dropped if a newer edit, a flush or a failed write happened since its
//!   timer was armed, or if the value is already saved. Failures are only
//!   re-attempted through `retry`.
//! - An in-flight write is never cancelled. If its saver is dropped the
//!   result is published to nobody.

use crate::error::SaveError;
use crate::types::{SaveSnapshot, SaveStatus};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Values a saver can persist
pub trait FieldValue: Clone + PartialEq + Serialize + Send + Sync + 'static {}

impl<T> FieldValue for T where T: Clone + PartialEq + Serialize + Send + Sync + 'static {}

/// Common surface of field and array-item savers
///
/// Lets the status indicator and the unsaved-changes guard work with either.
#[async_trait::async_trait]
pub trait Autosave: Send + Sync {
    /// Current status
    fn status(&self) -> SaveStatus;

    /// Follow status changes
    fn subscribe(&self) -> watch::Receiver<SaveSnapshot>;

    /// Write the current value now
    async fn flush(&self) -> SaveStatus;

    /// Re-attempt a failed write
    async fn retry(&self) -> SaveStatus;
}

/// Where a saver's writes go
#[async_trait::async_trait]
pub(crate) trait WriteTarget: Send + Sync {
    /// Whether the target document exists yet
    fn is_bound(&self) -> bool;

    /// Short label for logs
    fn describe(&self) -> String;

    /// Persist an encoded value
    async fn write(&self, value: Value) -> Result<(), SaveError>;
}

struct State<T> {
    current: T,
    /// Last successfully saved value
    baseline: T,
    /// Value of the in-flight or last failed write
    attempted: Option<T>,
    generation: u64,
    /// Failed writes so far
    failures: u64,
    timer: Option<JoinHandle<()>>,
    /// Fired timers whose writes are waiting for the gate
    queued: u32,
    /// A write holds the gate
    writing: bool,
}

/// Debounce cycle a timer was armed in
#[derive(Debug, Clone, Copy)]
struct Cycle {
    generation: u64,
    failures: u64,
}

pub(crate) struct SaverCore<T> {
    target: Box<dyn WriteTarget>,
    debounce: Duration,
    state: Mutex<State<T>>,
    snapshot: watch::Sender<SaveSnapshot>,
    write_gate: tokio::sync::Mutex<()>,
}

impl<T: FieldValue> SaverCore<T> {
    pub(crate) fn new(target: Box<dyn WriteTarget>, baseline: T, debounce: Duration) -> Arc<Self> {
        let (snapshot, _) = watch::channel(SaveSnapshot::default());
        Arc::new(Self {
            target,
            debounce,
            state: Mutex::new(State {
                current: baseline.clone(),
                baseline,
                attempted: None,
                generation: 0,
                failures: 0,
                timer: None,
                queued: 0,
                writing: false,
            }),
            snapshot,
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub(crate) fn status(&self) -> SaveStatus {
        self.snapshot.borrow().status
    }

    pub(crate) fn snapshot(&self) -> SaveSnapshot {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SaveSnapshot> {
        self.snapshot.subscribe()
    }

    pub(crate) fn current(&self) -> T {
        self.state.lock().current.clone()
    }

    pub(crate) fn baseline(&self) -> T {
        self.state.lock().baseline.clone()
    }

    pub(crate) fn attempted(&self) -> Option<T> {
        self.state.lock().attempted.clone()
    }

    pub(crate) fn set_value(self: &Arc<Self>, value: T) {
        let mut state = self.state.lock();
        state.current = value;

        if state.current == state.baseline {
            Self::cancel_timer(&mut state);
            if self.status() == SaveStatus::Dirty {
                tracing::debug!(field = %self.target.describe(), "reverted to saved value");
                if state.writing {
                    self.publish(|s| s.status = SaveStatus::Saving);
                } else {
                    state.attempted = None;
                    self.publish(|s| {
                        s.status = SaveStatus::Idle;
                        s.error = None;
                    });
                }
            }
            return;
        }

        self.schedule(&mut state);
        self.publish(|s| s.status = SaveStatus::Dirty);
    }

    pub(crate) async fn flush(self: &Arc<Self>) -> SaveStatus {
        let value = {
            let mut state = self.state.lock();
            Self::cancel_timer(&mut state);
            state.current.clone()
        };
        Arc::clone(self).write(value).await
    }

    pub(crate) async fn retry(self: &Arc<Self>) -> SaveStatus {
        if self.status() != SaveStatus::Error {
            return self.status();
        }
        let Some(value) = self.attempted() else {
            return self.status();
        };
        tracing::debug!(field = %self.target.describe(), "retrying failed write");
        Arc::clone(self).write(value).await
    }

    /// Cancel the pending debounce; an in-flight write keeps running
    pub(crate) fn unmount(&self) {
        let mut state = self.state.lock();
        Self::cancel_timer(&mut state);
    }

    fn cancel_timer(state: &mut State<T>) {
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    fn schedule(self: &Arc<Self>, state: &mut State<T>) {
        Self::cancel_timer(state);
        let cycle = Cycle {
            generation: state.generation,
            failures: state.failures,
        };
        let debounce = self.debounce;
        let weak: Weak<Self> = Arc::downgrade(self);

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let Some(core) = weak.upgrade() else {
                return;
            };
            if !core.take_due(cycle) {
                return;
            }
            // Detached so that cancelling a later timer cannot abort this write.
            tokio::spawn(async move {
                core.write_due(cycle).await;
            });
        }));
    }

    fn take_due(&self, cycle: Cycle) -> bool {
        let mut state = self.state.lock();
        if state.generation != cycle.generation {
            return false;
        }
        state.timer = None;
        state.queued += 1;
        true
    }

    fn publish(&self, modify: impl FnOnce(&mut SaveSnapshot)) {
        self.snapshot.send_modify(modify);
    }

    /// Explicit write of `value` (flush, retry)
    async fn write(self: Arc<Self>, value: T) -> SaveStatus {
        if !self.target.is_bound() {
            tracing::debug!(field = %self.target.describe(), "no document yet, skipping write");
            return self.status();
        }

        let _gate = self.write_gate.lock().await;
        self.send(value).await
    }

    /// Write of a debounce cycle whose timer fired
    async fn write_due(self: Arc<Self>, cycle: Cycle) {
        let _gate = self.write_gate.lock().await;
        let value = {
            let mut state = self.state.lock();
            state.queued -= 1;
            if !self.target.is_bound() {
                tracing::debug!(field = %self.target.describe(), "no document yet, skipping write");
                return;
            }
            if state.generation != cycle.generation
                || state.failures != cycle.failures
                || state.current == state.baseline
            {
                tracing::debug!(field = %self.target.describe(), "debounced write superseded");
                return;
            }
            state.current.clone()
        };
        self.send(value).await;
    }

    /// Send `value`; the caller holds the write gate
    async fn send(self: &Arc<Self>, value: T) -> SaveStatus {
        {
            let mut state = self.state.lock();
            state.attempted = Some(value.clone());
            state.writing = true;
        }
        self.publish(|s| {
            s.status = SaveStatus::Saving;
            s.error = None;
        });

        let result = match serde_json::to_value(&value) {
            Ok(encoded) => self.target.write(encoded).await,
            Err(err) => Err(SaveError::Encode(err)),
        };

        let mut state = self.state.lock();
        state.writing = false;
        match result {
            Ok(()) => {
                state.baseline = value;
                state.attempted = None;
                let status = if state.current == state.baseline {
                    Self::cancel_timer(&mut state);
                    SaveStatus::Saved
                } else {
                    // Edited again while writing: the newer value still needs a write.
                    if state.timer.is_none() && state.queued == 0 {
                        self.schedule(&mut state);
                    }
                    SaveStatus::Dirty
                };
                tracing::info!(field = %self.target.describe(), %status, "field saved");
                self.publish(|s| {
                    s.status = status;
                    s.last_saved = Some(Utc::now());
                    s.error = None;
                });
                status
            }
            Err(err) => {
                state.failures += 1;
                tracing::warn!(field = %self.target.describe(), error = %err, "field save failed");
                self.publish(|s| {
                    s.status = SaveStatus::Error;
                    s.error = Some(Arc::new(err));
                });
                SaveStatus::Error
            }
        }
    }
}
