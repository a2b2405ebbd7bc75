//! Cross-queue dependencies.
//!
//! A `Dependency` is released exactly once - usually by a `release_dependency`
//! command on the producing queue - and can then be acquired any number of
//! times by `acquire_dependency` commands on other queues, each becoming a
//! wait edge against the release's timeline value. Every acquiring wait
//! value is bounded by the release value, since acquires can only reference
//! a release that already happened.

use crate::ids::{BatchIndex, QueueSubmissionIndex};
use std::sync::Mutex;

#[derive(Copy, Clone, Debug)]
pub struct ReleaseEvent {
    pub queue_index: u32,
    pub batch_index: BatchIndex,
    pub queue_submission_index: QueueSubmissionIndex,
    pub semaphore_value: u64,
}

#[derive(Default)]
pub struct Dependency {
    release: Mutex<Option<ReleaseEvent>>,
}

impl Dependency {
    pub fn new() -> Dependency {
        Dependency::default()
    }

    /// Releasable exactly once; returns `false` (a usage error upstream) if
    /// already released.
    pub fn release(&self, event: ReleaseEvent) -> bool {
        let mut release = self.release.lock().unwrap();
        if release.is_some() {
            return false;
        }
        *release = Some(event);
        true
    }

    /// Acquirable any number of times, but only once released.
    pub fn acquire(&self) -> Option<ReleaseEvent> {
        *self.release.lock().unwrap()
    }

    pub fn is_released(&self) -> bool {
        self.release.lock().unwrap().is_some()
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("release", &*self.release.lock().unwrap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_one_shot() {
        let dep = Dependency::new();
        let event = ReleaseEvent {
            queue_index: 0,
            batch_index: crate::ids::Counter::<BatchIndex>::default().next(),
            queue_submission_index: crate::ids::Counter::<QueueSubmissionIndex>::default().next(),
            semaphore_value: 1,
        };
        assert!(dep.release(event));
        assert!(!dep.release(event));
    }

    #[test]
    fn acquire_before_release_observes_nothing() {
        let dep = Dependency::new();
        assert!(dep.acquire().is_none());
    }

    #[test]
    fn many_acquires_see_the_same_release_value() {
        let dep = Dependency::new();
        let event = ReleaseEvent {
            queue_index: 1,
            batch_index: crate::ids::Counter::<BatchIndex>::default().next(),
            queue_submission_index: crate::ids::Counter::<QueueSubmissionIndex>::default().next(),
            semaphore_value: 42,
        };
        dep.release(event);
        let a = dep.acquire().unwrap();
        let b = dep.acquire().unwrap();
        assert_eq!(a.semaphore_value, b.semaphore_value);
        assert!(a.semaphore_value >= b.semaphore_value);
    }
}
