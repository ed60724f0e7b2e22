//! Dependency (Subject) Implementation
//!
//! A Dep is the registry of watchers interested in one reactive property (or
//! in the shape of one reactive container). Reading a property calls
//! [`Dep::depend`]; writing it calls [`Dep::notify`].
//!
//! # Ownership
//!
//! Subscribers are held weakly. A watcher owns strong handles to the deps it
//! read during its last evaluation, and a dep only needs to reach the watcher
//! while it is alive. Watchers that were dropped without being torn down are
//! pruned on the next notification.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::watcher::{Watcher, WatcherId, WatcherInner};

/// Unique identifier for a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    /// Generate a new unique dependency ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DepId {
    fn default() -> Self {
        Self::new()
    }
}

/// A per-property registry of subscribed watchers.
///
/// Cloning a `Dep` yields another handle to the same registry.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

struct DepInner {
    id: DepId,
    /// Insertion-ordered; adding the same watcher twice is a no-op.
    subs: RefCell<IndexMap<WatcherId, Weak<WatcherInner>>>,
}

impl Dep {
    /// Create a dependency with no subscribers.
    pub fn new() -> Self {
        Self(Rc::new(DepInner {
            id: DepId::new(),
            subs: RefCell::new(IndexMap::new()),
        }))
    }

    /// Get the dependency's unique ID.
    pub fn id(&self) -> DepId {
        self.0.id
    }

    /// Register a watcher as a subscriber.
    pub fn add_sub(&self, watcher: &Watcher) {
        self.0
            .subs
            .borrow_mut()
            .entry(watcher.id())
            .or_insert_with(|| watcher.downgrade());
    }

    /// Remove a subscriber. Order of the remaining subscribers is kept.
    pub fn remove_sub(&self, id: WatcherId) {
        self.0.subs.borrow_mut().shift_remove(&id);
    }

    /// Subscribe the currently active watcher, if there is one.
    ///
    /// Outside of an evaluation this never touches subscriber state.
    pub fn depend(&self) {
        if let Some(watcher) = ReactiveContext::current() {
            watcher.add_dep(self);
        }
    }

    /// Invalidate every subscriber.
    ///
    /// Subscribers are snapshotted first, so watchers that subscribe or
    /// unsubscribe while being notified do not disturb this pass.
    pub fn notify(&self) {
        let mut subs: SmallVec<[Watcher; 8]> = {
            let mut registry = self.0.subs.borrow_mut();
            registry.retain(|_, weak| weak.strong_count() > 0);
            registry
                .values()
                .filter_map(Weak::upgrade)
                .map(Watcher::from_inner)
                .collect()
        };

        let stabilize = subs
            .first()
            .map(|w| w.runtime().config().diagnostics)
            .unwrap_or(false);
        if stabilize {
            subs.sort_by_key(Watcher::id);
        }

        tracing::trace!(dep = self.id().raw(), subscribers = subs.len(), "notify");

        for watcher in subs {
            watcher.update();
        }
    }

    /// Get the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.0
            .subs
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Check whether the given watcher is subscribed.
    pub fn has_sub(&self, id: WatcherId) -> bool {
        self.0.subs.borrow().contains_key(&id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
