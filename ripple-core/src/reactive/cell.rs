//! Reactive Cell Implementation
//!
//! A `ReactiveCell` is one reactive property: a value plus the [`Dep`] that
//! records who read it. Object properties are `ReactiveCell<Value>`, but the
//! cell is generic so typed state can use it directly.
//!
//! # How Cells Work
//!
//! 1. Reading the cell while a watcher is evaluating subscribes that watcher
//!    (and, for container values, lets it depend on the container's shape).
//!
//! 2. Writing a value that is the [`SameValue`] as the current one is a no-op.
//!
//! 3. Any other write stores the value, observes it if it is a container,
//!    and notifies every subscriber.

use std::cell::RefCell;
use std::fmt::Debug;

use super::context::ReactiveContext;
use super::dep::Dep;
use super::value::SameValue;

/// A tracked value with its own dependency.
///
/// # Example
///
/// ```rust,ignore
/// let count = ReactiveCell::new(0);
///
/// // Inside a watcher's getter this subscribes the watcher.
/// let value = count.get();
///
/// // Notifies subscribers.
/// count.set(5);
/// ```
pub struct ReactiveCell<T>
where
    T: SameValue + Clone + 'static,
{
    dep: Dep,
    value: RefCell<T>,
}

impl<T> ReactiveCell<T>
where
    T: SameValue + Clone + 'static,
{
    /// Create a cell holding `value`. Container values are observed.
    pub fn new(value: T) -> Self {
        value.observe_children();
        Self {
            dep: Dep::new(),
            value: RefCell::new(value),
        }
    }

    /// Get the current value, subscribing the active watcher if any.
    pub fn get(&self) -> T {
        let value = self.value.borrow().clone();
        if ReactiveContext::is_active() {
            self.dep.depend();
            value.depend_children();
        }
        value
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.value.borrow().clone()
    }

    /// Store a new value and notify subscribers if it changed.
    ///
    /// Returns `true` when subscribers were notified.
    pub fn set(&self, value: T) -> bool {
        if value.same_value(&self.value.borrow()) {
            return false;
        }
        value.observe_children();
        *self.value.borrow_mut() = value;
        self.dep.notify();
        true
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.value.borrow());
        self.set(next)
    }

    /// The dependency backing this cell.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.dep.subscriber_count()
    }
}

impl<T> Debug for ReactiveCell<T>
where
    T: SameValue + Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("dep", &self.dep.id())
            .field("value", &*self.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Runtime, Value, WatchOptions};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn cell_get_and_set() {
        let cell = ReactiveCell::new(0);
        assert_eq!(cell.get(), 0);

        assert!(cell.set(42));
        assert_eq!(cell.get(), 42);
    }

    #[test]
    fn cell_update() {
        let cell = ReactiveCell::new(10);
        cell.update(|v| v + 5);
        assert_eq!(cell.get_untracked(), 15);
    }

    #[test]
    fn unchanged_write_is_noop() {
        let cell = ReactiveCell::new(f64::NAN);
        assert!(!cell.set(f64::NAN));

        let cell = ReactiveCell::new(String::from("a"));
        assert!(!cell.set("a".into()));
        assert!(cell.set("b".into()));
    }

    #[test]
    fn read_outside_watcher_does_not_subscribe() {
        let cell = ReactiveCell::new(1);
        cell.get();
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn sync_watcher_sees_writes() {
        let runtime = Runtime::new();
        let cell = Rc::new(ReactiveCell::new(1.0));
        let seen = Rc::new(Cell::new(0.0));

        let source = cell.clone();
        let sink = seen.clone();
        let _unwatch = runtime.watch(
            move || Ok(Value::from(source.get())),
            move |new: &Value, _old: &Value| {
                sink.set(new.as_f64().unwrap_or_default());
                Ok(())
            },
            WatchOptions::sync(),
        );

        assert_eq!(cell.subscriber_count(), 1);
        cell.set(2.0);
        assert_eq!(seen.get(), 2.0);
    }
}
