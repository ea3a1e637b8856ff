//! Cross-thread async-work queue.
//!
//! Any thread can hand a closure to a loop via [`Queue::push`]. The queue
//! reports back whether the pushed closure is the new front of the list;
//! that signal is what tells the caller it must write the loop's wake fd
//! (see [`crate::poller::Poller::trigger`]) — later pushes in the same
//! drain cycle piggy-back on the pending wake.

use parking_lot::Mutex;

use crate::error::Result;

/// A unit of work deferred onto a loop's own thread.
pub type Work = Box<dyn FnOnce() -> Result<()> + Send>;

/// Mutex-protected FIFO of deferred closures.
#[derive(Default)]
pub struct Queue {
    items: Mutex<Vec<Work>>,
}

impl Queue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Append `work`. Returns `true` if this push transitioned the queue
    /// from empty to non-empty — the caller is then the one responsible
    /// for waking the owning loop.
    pub fn push(&self, work: Work) -> bool {
        let mut items = self.items.lock();
        items.push(work);
        items.len() == 1
    }

    /// Atomically take every pending closure, leaving the queue empty.
    pub fn drain(&self) -> Vec<Work> {
        let mut items = self.items.lock();
        std::mem::take(&mut *items)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn first_push_reports_new_front() {
        let q = Queue::new();
        assert!(q.push(Box::new(|| Ok(()))));
        assert!(!q.push(Box::new(|| Ok(()))));
    }

    #[test]
    fn drain_runs_in_order_and_empties_queue() {
        let q = Queue::new();
        let order = Arc::new(AtomicUsize::new(0));
        for expected in 0..5 {
            let order = order.clone();
            q.push(Box::new(move || {
                let prev = order.fetch_add(1, Ordering::SeqCst);
                assert_eq!(prev, expected);
                Ok(())
            }));
        }
        let work = q.drain();
        assert!(q.is_empty());
        for w in work {
            w().unwrap();
        }
        assert_eq!(order.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn drain_after_drain_reports_first_again() {
        let q = Queue::new();
        assert!(q.push(Box::new(|| Ok(()))));
        let _ = q.drain();
        assert!(q.push(Box::new(|| Ok(()))));
    }

    #[test]
    fn shutdown_sentinel_propagates_from_closure() {
        let q = Queue::new();
        q.push(Box::new(|| Err(CoreError::Shutdown)));
        let work = q.drain();
        let err = work.into_iter().next().unwrap()().unwrap_err();
        assert!(err.is_shutdown());
    }
}
