//! Watcher Queue
//!
//! The queue collects watchers invalidated during a synchronous task and
//! runs each of them once, in ascending id order, in a single flush.
//!
//! # Algorithm
//!
//! 1. `push` dedups by watcher id. Outside a flush the watcher is appended;
//!    during a flush it is inserted in id order after the watcher currently
//!    running, so it still runs in this flush.
//! 2. `flush` sorts by id, then walks the queue by index. The length is
//!    re-read on every step because running a watcher may enqueue others.
//! 3. A watcher re-queued while it runs counts towards a circular-update
//!    limit; past the limit the rest of the flush is abandoned.
//! 4. All state is reset afterwards so the next mutation schedules a fresh
//!    flush.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use crate::error::ReactiveError;
use crate::reactive::{Runtime, Watcher, WatcherId};

/// Pending watchers for one runtime.
#[derive(Default)]
pub struct WatcherQueue {
    queue: RefCell<Vec<Watcher>>,
    /// Ids currently in the queue and not yet run.
    has: RefCell<HashSet<WatcherId>>,
    circular: RefCell<HashMap<WatcherId, u32>>,
    /// A flush has been scheduled and not finished.
    waiting: Cell<bool>,
    flushing: Cell<bool>,
    /// Position of the watcher currently running.
    index: Cell<usize>,
}

/// Outcome of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    /// Watchers run.
    pub ran: usize,
    /// Whether the circular-update guard ended the flush early.
    pub aborted: bool,
}

impl WatcherQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a watcher.
    ///
    /// Returns `true` when the caller has to schedule a flush.
    pub fn push(&self, watcher: Watcher) -> bool {
        let id = watcher.id();
        if !self.has.borrow_mut().insert(id) {
            return false;
        }

        {
            let mut queue = self.queue.borrow_mut();
            if self.flushing.get() {
                let mut pos = queue.len();
                while pos > 0 && queue[pos - 1].id() > id {
                    pos -= 1;
                }
                let pos = pos.max(self.index.get() + 1).min(queue.len());
                queue.insert(pos, watcher);
            } else {
                queue.push(watcher);
            }
        }

        tracing::trace!(id = id.raw(), flushing = self.flushing.get(), "watcher queued");
        !self.waiting.replace(true)
    }

    /// Whether the watcher is queued and has not run yet.
    pub fn contains(&self, id: WatcherId) -> bool {
        self.has.borrow().contains(&id)
    }

    /// Number of queued watchers, including ones already run in the
    /// current flush.
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Whether a flush is scheduled or running.
    pub fn is_waiting(&self) -> bool {
        self.waiting.get()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Run every queued watcher once, in id order.
    pub fn flush(&self, runtime: &Runtime) -> FlushStats {
        self.flushing.set(true);
        self.queue.borrow_mut().sort_by_key(Watcher::id);

        let max_updates = runtime.config().max_update_count;
        let mut stats = FlushStats {
            ran: 0,
            aborted: false,
        };

        let mut index = 0;
        loop {
            self.index.set(index);
            let Some(watcher) = self.queue.borrow().get(index).cloned() else {
                break;
            };

            let id = watcher.id();
            self.has.borrow_mut().remove(&id);
            watcher.run();
            stats.ran += 1;

            if self.has.borrow().contains(&id) {
                let count = {
                    let mut circular = self.circular.borrow_mut();
                    let count = circular.entry(id).or_insert(0);
                    *count += 1;
                    *count
                };
                if count > max_updates {
                    let err = ReactiveError::CircularUpdate {
                        watcher: watcher.kind().loop_location(),
                        count,
                    };
                    let owner = watcher.owner();
                    runtime.report(&err, owner.as_ref().map(|o| o.name()));
                    stats.aborted = true;
                    break;
                }
            }

            index += 1;
        }

        self.reset();
        tracing::debug!(ran = stats.ran, aborted = stats.aborted, "flushed watcher queue");
        stats
    }

    fn reset(&self) {
        self.queue.borrow_mut().clear();
        self.has.borrow_mut().clear();
        self.circular.borrow_mut().clear();
        self.index.set(0);
        self.waiting.set(false);
        self.flushing.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Value;
    use std::rc::Rc;

    #[test]
    fn push_dedups_and_requests_one_flush() {
        let runtime = Runtime::new();
        let queue = WatcherQueue::new();
        let watcher = runtime.effect(|| Ok(Value::Null));

        assert!(queue.push(watcher.clone()));
        assert!(!queue.push(watcher.clone()));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(watcher.id()));
        assert!(queue.is_waiting());
    }

    #[test]
    fn flush_runs_in_id_order_and_resets() {
        let runtime = Runtime::new();
        let queue = WatcherQueue::new();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        let make = |tag: &'static str| {
            let order = order.clone();
            runtime.effect(move || {
                order.borrow_mut().push(tag);
                Ok(Value::Null)
            })
        };
        let first = make("first");
        let second = make("second");
        order.borrow_mut().clear();

        queue.push(second.clone());
        queue.push(first.clone());
        let stats = queue.flush(&runtime);

        assert_eq!(*order.borrow(), vec!["first", "second"]);
        assert_eq!(stats, FlushStats { ran: 2, aborted: false });
        assert!(queue.is_empty());
        assert!(!queue.is_waiting());
        assert!(!queue.is_flushing());
    }

    #[test]
    fn watcher_queued_mid_flush_runs_in_same_flush() {
        let runtime = Runtime::new();
        let queue = Rc::new(WatcherQueue::new());
        let armed = Rc::new(Cell::new(false));
        let low_runs = Rc::new(Cell::new(0));

        let low = {
            let low_runs = low_runs.clone();
            runtime.effect(move || {
                low_runs.set(low_runs.get() + 1);
                Ok(Value::Null)
            })
        };
        let high = {
            let queue = queue.clone();
            let armed = armed.clone();
            let low = low.clone();
            runtime.effect(move || {
                if armed.get() {
                    queue.push(low.clone());
                }
                Ok(Value::Null)
            })
        };
        low_runs.set(0);
        armed.set(true);

        queue.push(high);
        let stats = queue.flush(&runtime);

        assert_eq!(stats.ran, 2);
        assert_eq!(low_runs.get(), 1);
    }

    #[test]
    fn self_requeueing_watcher_trips_guard() {
        let runtime = Runtime::with_config(crate::config::Config {
            max_update_count: 5,
            ..Default::default()
        });
        let reported = Rc::new(Cell::new(0));
        {
            let reported = reported.clone();
            runtime.set_error_handler(move |err, _, info| {
                assert!(matches!(err, ReactiveError::CircularUpdate { count: 6, .. }));
                assert_eq!(info, "scheduler flush");
                reported.set(reported.get() + 1);
            });
        }

        let queue = Rc::new(WatcherQueue::new());
        let armed = Rc::new(Cell::new(false));
        let slot: Rc<RefCell<Option<Watcher>>> = Rc::new(RefCell::new(None));
        let watcher = {
            let queue = queue.clone();
            let armed = armed.clone();
            let slot = slot.clone();
            runtime.effect(move || {
                if armed.get() {
                    if let Some(me) = slot.borrow().clone() {
                        queue.push(me);
                    }
                }
                Ok(Value::Null)
            })
        };
        *slot.borrow_mut() = Some(watcher.clone());
        armed.set(true);

        queue.push(watcher);
        let stats = queue.flush(&runtime);

        assert!(stats.aborted);
        assert_eq!(stats.ran, 6);
        assert_eq!(reported.get(), 1);
        assert!(queue.is_empty());
    }
}
