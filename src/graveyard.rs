//! Deferred destruction.
//!
//! A resource's `Drop` glue hands its owned native objects to the *current*
//! batch's graveyard instead of destroying them immediately. `_cleanup`
//! queries every queue's timeline semaphore and pops any batch whose
//! semaphores have all passed, destroying what it collected and, as the
//! final step, nulling any descriptor-array slot still pointing at the
//! destroyed resource.

use crate::ids::{BatchIndex, UniqueResourceId};
use std::sync::{Arc, Mutex};

/// Anything a graveyard entry needs to finish destroying a resource:
/// dropping its native handle and nulling its slot in any bindless array.
pub trait Disposable: Send {
    fn dispose(self: Box<Self>);
}

struct Epoch {
    batch: BatchIndex,
    /// The timeline value every queue must reach before this batch's
    /// graveyard entries may be destroyed.
    wait_values: Vec<(u32, u64)>,
    entries: Vec<Box<dyn Disposable>>,
}

#[derive(Default)]
pub struct Graveyard {
    epochs: Mutex<Vec<Epoch>>,
}

impl Graveyard {
    pub fn new() -> Graveyard {
        Graveyard::default()
    }

    /// Opens bookkeeping for a newly started batch. Must be called once per
    /// batch, in batch-index order.
    pub fn open_batch(&self, batch: BatchIndex, wait_values: Vec<(u32, u64)>) {
        self.epochs.lock().unwrap().push(Epoch {
            batch,
            wait_values,
            entries: Vec::new(),
        });
    }

    /// Schedules `item` for destruction once the most recently opened
    /// batch's timeline values have all been reached.
    pub fn deferred_delete(&self, item: Box<dyn Disposable>) {
        let mut epochs = self.epochs.lock().unwrap();
        let epoch = epochs.last_mut().expect("graveyard: no batch open");
        epoch.entries.push(item);
    }

    /// Pops and destroys every batch (other than the `keep_batches` most
    /// recent) whose semaphores have all passed `current_timeline_value`.
    /// Returns the batch indices that were collected, for statistics.
    pub fn cleanup(
        &self,
        keep_batches: usize,
        current_timeline_value: &dyn Fn(u32) -> u64,
    ) -> Vec<BatchIndex> {
        let mut epochs = self.epochs.lock().unwrap();
        let collectible_count = epochs.len().saturating_sub(keep_batches);
        let mut collected = Vec::new();
        let mut i = 0;
        while i < collectible_count {
            let all_passed = epochs[i]
                .wait_values
                .iter()
                .all(|&(queue, value)| current_timeline_value(queue) >= value);
            if !all_passed {
                break;
            }
            let epoch = epochs.remove(i);
            for entry in epoch.entries {
                entry.dispose();
            }
            collected.push(epoch.batch);
            // `remove` shifted everything after `i` left by one, so the
            // next collectible epoch (if any) is now also at `i`.
        }
        collected
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.lock().unwrap().iter().all(|e| e.entries.is_empty())
    }

    pub fn open_batch_count(&self) -> usize {
        self.epochs.lock().unwrap().len()
    }
}

/// A channel resources drop their id into when their last strong handle
/// goes away. `Context` owns the receiving end and drains it at the start
/// of each `execute_all`, the only place batch/queue state is mutated,
/// moving each id into the current batch's graveyard instead of destroying
/// it on whatever thread happened to drop the last `Arc`.
#[derive(Clone, Default)]
pub struct PendingDrops(Arc<Mutex<Vec<UniqueResourceId>>>);

impl PendingDrops {
    pub fn new() -> PendingDrops {
        PendingDrops::default()
    }

    pub fn drain(&self) -> Vec<UniqueResourceId> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Embedded as a field in every resource type (`Image2D`, `Buffer`, ...).
/// Its only job is reporting the owning resource's id to `PendingDrops`
/// when the resource itself is dropped - the redesign-note replacement for
/// a shared-ptr custom deleter.
pub struct DropNotify {
    id: UniqueResourceId,
    sink: PendingDrops,
}

impl DropNotify {
    pub fn new(id: UniqueResourceId, sink: PendingDrops) -> DropNotify {
        DropNotify { id, sink }
    }
}

impl Drop for DropNotify {
    fn drop(&mut self) {
        self.sink.0.lock().unwrap().push(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flag(Arc<AtomicBool>);
    impl Disposable for Flag {
        fn dispose(self: Box<Self>) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn cleanup_waits_for_all_queues_to_pass() {
        let graveyard = Graveyard::new();
        let disposed = Arc::new(AtomicBool::new(false));
        graveyard.open_batch(BatchIndex::default_for_test(), vec![(0, 5), (1, 3)]);
        graveyard.deferred_delete(Box::new(Flag(disposed.clone())));

        let collected = graveyard.cleanup(0, &|queue| if queue == 0 { 5 } else { 1 });
        assert!(collected.is_empty());
        assert!(!disposed.load(Ordering::SeqCst));

        let collected = graveyard.cleanup(0, &|_queue| 10);
        assert_eq!(collected.len(), 1);
        assert!(disposed.load(Ordering::SeqCst));
    }

    #[test]
    fn keep_batches_withholds_the_most_recent() {
        let graveyard = Graveyard::new();
        graveyard.open_batch(BatchIndex::default_for_test(), vec![(0, 1)]);
        graveyard.open_batch(BatchIndex::default_for_test(), vec![(0, 2)]);
        let collected = graveyard.cleanup(1, &|_| 100);
        assert_eq!(collected.len(), 1);
    }
}
