//! Next-Tick Queue
//!
//! Deferred callbacks run after the current synchronous task. The queue is
//! host-agnostic: something has to call [`TickQueue::run_pending`]. That is
//! either a test or embedder calling [`Runtime::run_ticks`] by hand, or the
//! async driver ([`Runtime::drive`]) woken through the queue's [`Notify`].
//!
//! [`Runtime::run_ticks`]: crate::reactive::Runtime::run_ticks
//! [`Runtime::drive`]: crate::reactive::Runtime::drive

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tokio::sync::Notify;

type Task = Box<dyn FnOnce()>;

/// FIFO of deferred callbacks.
pub struct TickQueue {
    callbacks: RefCell<VecDeque<Task>>,
    notify: Rc<Notify>,
}

impl TickQueue {
    pub fn new() -> Self {
        Self {
            callbacks: RefCell::new(VecDeque::new()),
            notify: Rc::new(Notify::new()),
        }
    }

    /// Defer `f` and wake the driver, if one is waiting.
    pub fn push(&self, f: impl FnOnce() + 'static) {
        self.callbacks.borrow_mut().push_back(Box::new(f));
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Handle the driver waits on.
    pub fn notifier(&self) -> Rc<Notify> {
        self.notify.clone()
    }

    /// Run callbacks until the queue is empty, returning how many ran.
    ///
    /// Callbacks are taken in batches; one deferred from inside a callback
    /// lands in the next batch of the same call.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch = std::mem::take(&mut *self.callbacks.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for task in batch {
                task();
                ran += 1;
            }
        }
        ran
    }
}

impl Default for TickQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TickQueue {
    fn drop(&mut self) {
        // lets a parked driver observe that its runtime is gone
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runs_in_fifo_order() {
        let queue = TickQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            queue.push(move || log.borrow_mut().push(i));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn nested_callbacks_run_in_later_batch() {
        let queue = Rc::new(TickQueue::new());
        let hits = Rc::new(Cell::new(0));

        let (inner_queue, inner_hits) = (queue.clone(), hits.clone());
        queue.push(move || {
            inner_hits.set(inner_hits.get() + 1);
            let hits = inner_hits.clone();
            inner_queue.push(move || hits.set(hits.get() + 10));
        });

        assert_eq!(queue.run_pending(), 2);
        assert_eq!(hits.get(), 11);
    }
}
