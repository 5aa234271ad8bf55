//! Queue Coordinator - global admission control
//!
//! Decides whether a task may transfer now or has to wait, and promotes
//! waiting tasks (highest priority first, FIFO among equals) whenever a slot
//! frees up. Entries are called back only after the internal lock is released,
//! so a callback may freely re-enter the coordinator.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Something the coordinator can admit, queue and later promote
pub trait Admissible: Send + Sync {
    fn id(&self) -> Uuid;

    fn priority(&self) -> i32;

    /// Called once the entry has been moved from the wait set into the
    /// in-progress set. The entry now owns a slot and must eventually
    /// `release` it.
    fn promote(self: Arc<Self>);

    /// Called when `clear_queue` drops the entry from the wait set
    fn abandon(self: Arc<Self>);
}

/// Result of an admission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Queued,
}

struct QueuedEntry {
    priority: i32,
    seq: u64,
    entry: Arc<dyn Admissible>,
}

#[derive(Default)]
struct CoordinatorState {
    /// 0 = unlimited
    max_concurrent: usize,
    in_progress: HashSet<Uuid>,
    queued: Vec<QueuedEntry>,
    next_seq: u64,
}

impl CoordinatorState {
    fn has_capacity(&self) -> bool {
        self.max_concurrent == 0 || self.in_progress.len() < self.max_concurrent
    }

    /// Index of the highest-priority, earliest-queued entry
    fn next_index(&self) -> Option<usize> {
        self.queued
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.priority.cmp(&b.priority).then(b.seq.cmp(&a.seq)))
            .map(|(index, _)| index)
    }

    /// Move as many queued entries into progress as capacity allows
    fn take_promotions(&mut self) -> Vec<Arc<dyn Admissible>> {
        let mut promoted = Vec::new();
        while self.has_capacity() {
            let Some(index) = self.next_index() else {
                break;
            };
            let next = self.queued.remove(index);
            self.in_progress.insert(next.entry.id());
            promoted.push(next.entry);
        }
        promoted
    }
}

/// Process-wide admission control for download tasks
pub struct QueueCoordinator {
    state: Mutex<CoordinatorState>,
}

impl QueueCoordinator {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                max_concurrent,
                ..Default::default()
            }),
        }
    }

    /// Set the concurrency ceiling (0 = unlimited).
    ///
    /// Raising the ceiling promotes queued tasks immediately; lowering it
    /// never preempts running ones.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        let promoted = {
            let mut state = self.state.lock();
            state.max_concurrent = max_concurrent;
            state.take_promotions()
        };
        info!("Max concurrent downloads set to {}", max_concurrent);
        Self::dispatch(promoted);
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().max_concurrent
    }

    /// Admit `entry` now if a slot is free, otherwise place it in the wait set
    pub fn try_admit(&self, entry: Arc<dyn Admissible>) -> Admission {
        let mut state = self.state.lock();
        let id = entry.id();

        if state.in_progress.contains(&id) {
            return Admission::Admitted;
        }
        if state.queued.iter().any(|q| q.entry.id() == id) {
            return Admission::Queued;
        }

        if state.has_capacity() {
            state.in_progress.insert(id);
            debug!("Admitted task {} ({} in progress)", id, state.in_progress.len());
            Admission::Admitted
        } else {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queued.push(QueuedEntry {
                priority: entry.priority(),
                seq,
                entry,
            });
            debug!("Queued task {} ({} waiting)", id, state.queued.len());
            Admission::Queued
        }
    }

    /// Vacate the slot held by `id` and promote the next queued task(s)
    pub fn release(&self, id: Uuid) {
        let promoted = {
            let mut state = self.state.lock();
            if !state.in_progress.remove(&id) {
                return;
            }
            debug!("Released slot held by task {}", id);
            state.take_promotions()
        };
        Self::dispatch(promoted);
    }

    /// Remove a single entry from the wait set. Returns false if it was not queued.
    pub fn withdraw(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let before = state.queued.len();
        state.queued.retain(|q| q.entry.id() != id);
        state.queued.len() != before
    }

    /// Abandon all pending work; running transfers are not affected
    pub fn clear_queue(&self) {
        let abandoned: Vec<_> = {
            let mut state = self.state.lock();
            state.queued.drain(..).map(|q| q.entry).collect()
        };
        info!("Cleared {} queued task(s)", abandoned.len());
        for entry in abandoned {
            entry.abandon();
        }
    }

    pub fn in_progress_count(&self) -> usize {
        self.state.lock().in_progress.len()
    }

    pub fn queued_count(&self) -> usize {
        self.state.lock().queued.len()
    }

    pub fn is_queued(&self, id: Uuid) -> bool {
        self.state.lock().queued.iter().any(|q| q.entry.id() == id)
    }

    fn dispatch(promoted: Vec<Arc<dyn Admissible>>) {
        for entry in promoted {
            info!("Promoting queued task {}", entry.id());
            entry.promote();
        }
    }
}

impl Default for QueueCoordinator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for QueueCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("QueueCoordinator")
            .field("max_concurrent", &state.max_concurrent)
            .field("in_progress", &state.in_progress.len())
            .field("queued", &state.queued.len())
            .finish()
    }
}
