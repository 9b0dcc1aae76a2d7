//! Debounced, per-field write pipeline from the grid to the grading service.
//!
//! Every [`FieldKey`] is its own channel with its own timer and status slot:
//!
//! ```text
//! Idle -> Saving -> Saved -> Idle
//!                \-> Error -> Idle
//! ```
//!
//! An edit is applied to the grid immediately, then a commit is scheduled
//! after the debounce delay. A newer edit to the same key replaces a commit
//! that has not fired yet. A commit that has already fired is left alone, and
//! its response may arrive after a newer edit was scheduled. Failed writes are
//! not rolled back and not retried; the next edit supersedes them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Autosave;
use crate::grading::{FieldPatch, GradingService};
use crate::grid::GridModel;
use crate::model::{CourseId, FieldKey, FieldValue, SaveStatus};
use crate::validate::ValidationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("autosave is torn down; edit to {0} dropped")]
    Closed(FieldKey),
}

/// Status change broadcast to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub key: FieldKey,
    pub status: SaveStatus,
}

struct Pending {
    seq: u64,
    handle: JoinHandle<()>,
}

struct InFlight {
    key: FieldKey,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    closed: bool,
    next_seq: u64,
    /// Commits waiting for their timer.
    pending: HashMap<FieldKey, Pending>,
    /// Commits whose request is underway, by sequence number.
    in_flight: HashMap<u64, InFlight>,
    /// Auto-clear timers for Saved/Error statuses.
    clears: HashMap<FieldKey, Pending>,
    latest_seq: HashMap<FieldKey, u64>,
    statuses: HashMap<FieldKey, SaveStatus>,
}

impl Registry {
    /// A commit for `key` is scheduled or underway.
    fn is_busy(&self, key: &FieldKey) -> bool {
        self.pending.contains_key(key) || self.in_flight.values().any(|f| f.key == *key)
    }
}

struct Inner {
    service: Arc<dyn GradingService>,
    grid: Arc<Mutex<GridModel>>,
    course_id: CourseId,
    settings: Autosave,
    registry: Mutex<Registry>,
    events: broadcast::Sender<StatusEvent>,
}

pub struct AutosaveCoordinator {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AutosaveCoordinator {
    pub fn new(
        service: Arc<dyn GradingService>,
        grid: Arc<Mutex<GridModel>>,
        course_id: CourseId,
        settings: Autosave,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                service,
                grid,
                course_id,
                settings,
                registry: Mutex::new(Registry::default()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self, key: &FieldKey) -> SaveStatus {
        lock(&self.inner.registry)
            .statuses
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    /// Number of keys with a commit still waiting for its timer.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.registry).pending.len()
    }

    /// Number of write requests currently underway.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.inner.registry).in_flight.len()
    }

    /// Keys whose sequence number is still tracked.
    pub fn tracked_count(&self) -> usize {
        lock(&self.inner.registry).latest_seq.len()
    }

    /// Apply `value` to the grid and schedule its commit.
    ///
    /// Must be called from within a tokio runtime. Invalid values are
    /// rejected before the grid or the schedule is touched. After
    /// [`AutosaveCoordinator::cancel_all`] every edit fails with
    /// [`EditError::Closed`] and the grid is left alone.
    pub fn edit(&self, key: FieldKey, value: FieldValue) -> Result<(), EditError> {
        if lock(&self.inner.registry).closed {
            warn!(%key, "edit after teardown dropped");
            return Err(EditError::Closed(key));
        }

        lock(&self.inner.grid).apply_edit(key, &value)?;

        let mut reg = lock(&self.inner.registry);
        if reg.closed {
            warn!(%key, "edit after teardown dropped");
            return Err(EditError::Closed(key));
        }
        if let Some(clear) = reg.clears.remove(&key) {
            clear.handle.abort();
        }
        if let Some(previous) = reg.pending.remove(&key) {
            previous.handle.abort();
            debug!(%key, superseded = previous.seq, "coalesced pending commit");
        }

        reg.next_seq += 1;
        let seq = reg.next_seq;
        reg.latest_seq.insert(key, seq);
        self.inner.set_status(&mut reg, key, SaveStatus::Saving);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            Inner::commit_after_delay(inner, key, value, seq).await;
        });
        reg.pending.insert(key, Pending { seq, handle });
        debug!(%key, seq, "commit scheduled");
        Ok(())
    }

    /// Drop Saved/Error statuses after the grid was replaced. Saving entries
    /// stay because their commits are still scheduled or underway.
    pub fn forget_settled(&self) {
        let mut reg = lock(&self.inner.registry);
        for (_, clear) in reg.clears.drain() {
            clear.handle.abort();
        }
        reg.statuses.retain(|_, status| *status == SaveStatus::Saving);
        let idle: Vec<FieldKey> = reg
            .latest_seq
            .keys()
            .filter(|key| !reg.is_busy(key))
            .copied()
            .collect();
        for key in idle {
            reg.latest_seq.remove(&key);
        }
    }

    /// Cancel every timer and request. Nothing is sent and no status changes
    /// after this returns.
    pub fn cancel_all(&self) {
        let mut reg = lock(&self.inner.registry);
        if reg.closed {
            return;
        }
        reg.closed = true;
        let pending = reg.pending.len();
        let in_flight = reg.in_flight.len();
        for (_, p) in reg.pending.drain() {
            p.handle.abort();
        }
        for (_, f) in reg.in_flight.drain() {
            f.handle.abort();
        }
        for (_, c) in reg.clears.drain() {
            c.handle.abort();
        }
        reg.statuses.clear();
        reg.latest_seq.clear();
        info!(pending, in_flight, "autosave torn down");
    }
}

impl Drop for AutosaveCoordinator {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl Inner {
    fn set_status(&self, reg: &mut Registry, key: FieldKey, status: SaveStatus) {
        if status == SaveStatus::Idle {
            reg.statuses.remove(&key);
            reg.latest_seq.remove(&key);
        } else {
            reg.statuses.insert(key, status);
        }
        // No subscribers is fine.
        let _ = self.events.send(StatusEvent { key, status });
    }

    async fn commit_after_delay(inner: Arc<Inner>, key: FieldKey, value: FieldValue, seq: u64) {
        tokio::time::sleep(inner.settings.debounce()).await;

        {
            let mut reg = lock(&inner.registry);
            if reg.closed {
                return;
            }
            let Some(pending) = reg.pending.remove(&key) else {
                return;
            };
            if pending.seq != seq {
                reg.pending.insert(key, pending);
                return;
            }
            reg.in_flight.insert(
                seq,
                InFlight {
                    key,
                    handle: pending.handle,
                },
            );
        }

        let patch = FieldPatch {
            course_id: inner.course_id,
            assignment_id: key.assignment_id,
            student_id: key.student_id,
            field: key.field,
            value,
        };
        let result = inner.service.patch_field(&patch).await;

        let mut reg = lock(&inner.registry);
        reg.in_flight.remove(&seq);
        if reg.closed {
            return;
        }
        if inner.settings.discard_stale_responses
            && reg.latest_seq.get(&key).copied() != Some(seq)
        {
            debug!(%key, seq, "discarding response superseded by a newer edit");
            if !reg.is_busy(&key) && reg.statuses.get(&key) == Some(&SaveStatus::Saving) {
                inner.set_status(&mut reg, key, SaveStatus::Idle);
            }
            return;
        }

        let (status, delay) = match result {
            Ok(()) => {
                debug!(%key, seq, "field saved");
                (SaveStatus::Saved, inner.settings.saved_clear())
            }
            Err(err) => {
                warn!(?err, %key, seq, "field save failed; keeping local value");
                (SaveStatus::Error, inner.settings.error_clear())
            }
        };
        inner.set_status(&mut reg, key, status);
        Inner::schedule_clear(&inner, &mut reg, key, delay);
    }

    fn schedule_clear(inner: &Arc<Inner>, reg: &mut Registry, key: FieldKey, delay: Duration) {
        reg.next_seq += 1;
        let token = reg.next_seq;
        if let Some(previous) = reg.clears.remove(&key) {
            previous.handle.abort();
        }
        let task_inner = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut reg = lock(&task_inner.registry);
            if reg.closed {
                return;
            }
            match reg.clears.get(&key) {
                Some(clear) if clear.seq == token => {
                    reg.clears.remove(&key);
                }
                _ => return,
            }
            let next = if reg.is_busy(&key) {
                SaveStatus::Saving
            } else {
                SaveStatus::Idle
            };
            task_inner.set_status(&mut reg, key, next);
        });
        reg.clears.insert(key, Pending { seq: token, handle });
    }
}
