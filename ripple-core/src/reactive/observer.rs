//! Observer
//!
//! Observing a value instruments it in place:
//!
//! - objects get a [`ReactiveCell`] per existing property, and every nested
//!   container is observed as well
//! - arrays get their elements observed; their mutating operations already
//!   notify the shape dependency once an observer is attached
//!
//! Each observed container carries exactly one [`Observer`]. Observing is
//! idempotent: a container that already has one is returned as-is.
//!
//! Primitives, opaque values, frozen objects and containers marked raw are
//! never instrumented. Reads and writes on them are plain and untracked.

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::error::MutationError;

use super::array::ReactiveArray;
use super::cell::ReactiveCell;
use super::dep::Dep;
use super::object::{ReactiveObject, Slot};
use super::value::{PropKey, Value};

thread_local! {
    static SHOULD_CONVERT: Cell<bool> = const { Cell::new(true) };
}

/// Whether non-root values are currently converted by [`observe`].
pub fn should_convert() -> bool {
    SHOULD_CONVERT.with(Cell::get)
}

/// Run `f` with conversion of non-root values disabled.
///
/// Values stored while this is active keep whatever observation state they
/// already had. Used for props handed down from a parent.
pub fn without_conversion<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            SHOULD_CONVERT.with(|flag| flag.set(self.0));
        }
    }

    let _restore = Restore(SHOULD_CONVERT.with(|flag| flag.replace(false)));
    f()
}

/// The instrumentation attached to an observed container.
#[derive(Clone)]
pub struct Observer(Rc<ObserverInner>);

struct ObserverInner {
    /// Shape dependency: notified when keys are added/removed or array
    /// elements change.
    dep: Dep,
    /// Number of instances using this container as their root data.
    root_count: Cell<usize>,
}

impl Observer {
    pub(crate) fn new() -> Self {
        Self(Rc::new(ObserverInner {
            dep: Dep::new(),
            root_count: Cell::new(0),
        }))
    }

    /// The container-level dependency.
    pub fn dep(&self) -> &Dep {
        &self.0.dep
    }

    /// How many instances use this container as root data.
    pub fn root_count(&self) -> usize {
        self.0.root_count.get()
    }

    pub(crate) fn retain_root(&self) {
        self.0.root_count.set(self.0.root_count.get() + 1);
    }

    pub(crate) fn release_root(&self) {
        self.0.root_count.set(self.0.root_count.get().saturating_sub(1));
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.0.dep.id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// Observe `value`, returning its observer.
///
/// Returns `None` for values that are not instrumented. A value that is
/// already observed keeps its observer; `as_root_data` then only bumps the
/// root count. Root data is converted even inside [`without_conversion`].
pub fn observe(value: &Value, as_root_data: bool) -> Option<Observer> {
    let ob = match value {
        Value::Object(object) => observe_object(object, as_root_data),
        Value::Array(array) => observe_array(array, as_root_data),
        _ => None,
    }?;
    if as_root_data {
        ob.retain_root();
    }
    Some(ob)
}

fn observe_object(object: &ReactiveObject, as_root_data: bool) -> Option<Observer> {
    if let Some(ob) = object.observer() {
        return Some(ob.clone());
    }
    if !(as_root_data || should_convert()) || object.is_frozen() || object.is_raw() {
        return None;
    }

    let ob = object.attach_observer().clone();
    for key in object.plain_keys() {
        if let Some(value) = object.get_untracked(&key) {
            define_reactive(object, key, value);
        }
    }
    tracing::trace!(dep = ob.dep().id().raw(), "observed object");
    Some(ob)
}

fn observe_array(array: &ReactiveArray, as_root_data: bool) -> Option<Observer> {
    if let Some(ob) = array.observer() {
        return Some(ob.clone());
    }
    if !(as_root_data || should_convert()) || array.is_raw() {
        return None;
    }

    let ob = array.attach_observer().clone();
    observe_all(&array.to_vec_untracked());
    tracing::trace!(dep = ob.dep().id().raw(), "observed array");
    Some(ob)
}

/// Observe every value in `items`.
pub fn observe_all(items: &[Value]) {
    for item in items {
        observe(item, false);
    }
}

/// Make `key` a reactive property of `target` holding `value`.
///
/// The value is observed. An existing property of the same name is
/// replaced without notification.
pub fn define_reactive(target: &ReactiveObject, key: impl Into<String>, value: Value) {
    let cell = Rc::new(ReactiveCell::new(value));
    target.install_cell(key.into(), cell);
}

/// Let the active watcher depend on the shape of every observed container
/// nested in `array`.
///
/// Array elements have no per-index dependency, so a watcher that read an
/// array also needs to hear about mutations of arrays and objects inside it.
pub fn depend_array(array: &ReactiveArray) {
    for item in array.to_vec_untracked() {
        match &item {
            Value::Object(object) => {
                if let Some(ob) = object.observer() {
                    ob.dep().depend();
                }
            }
            Value::Array(nested) => {
                if let Some(ob) = nested.observer() {
                    ob.dep().depend();
                }
                depend_array(nested);
            }
            _ => {}
        }
    }
}

/// Reactively set `key` on `target`, returning `value`.
///
/// - arrays: the element is replaced through a splice, which notifies
/// - objects with an existing key: plain assignment through the setter
/// - objects with a new key: a reactive property is defined and the
///   object's shape dependency is notified
///
/// Objects used as an instance's root data refuse new keys. A refused call
/// changes nothing.
pub fn set(
    target: &Value,
    key: impl Into<PropKey>,
    value: Value,
) -> Result<Value, MutationError> {
    match (target, key.into()) {
        (Value::Array(array), PropKey::Index(index)) => {
            array.set_index(index, value.clone())?;
        }
        (Value::Object(object), PropKey::Name(name)) => {
            set_property(object, name, value.clone())?;
        }
        (target, key) => {
            return Err(MutationError::InvalidTarget {
                target_type: target.type_name(),
                key: key.to_string(),
            });
        }
    }
    Ok(value)
}

fn set_property(object: &ReactiveObject, key: String, value: Value) -> Result<(), MutationError> {
    if object.has_own(&key) {
        object.insert(key, value);
        return Ok(());
    }

    let Some(ob) = object.observer().cloned() else {
        object.insert(key, value);
        return Ok(());
    };

    if ob.root_count() > 0 {
        return Err(MutationError::RootDataAdd { key });
    }

    define_reactive(object, key, value);
    ob.dep().notify();
    Ok(())
}

/// Reactively delete `key` from `target`.
///
/// Deleting a missing key is a no-op. On an observed object both the
/// removed property's subscribers and the object's shape subscribers are
/// notified.
pub fn del(target: &Value, key: impl Into<PropKey>) -> Result<(), MutationError> {
    match (target, key.into()) {
        (Value::Array(array), PropKey::Index(index)) => {
            array.remove_index(index);
            Ok(())
        }
        (Value::Object(object), PropKey::Name(name)) => delete_property(object, &name),
        (target, key) => Err(MutationError::InvalidTarget {
            target_type: target.type_name(),
            key: key.to_string(),
        }),
    }
}

fn delete_property(object: &ReactiveObject, key: &str) -> Result<(), MutationError> {
    let ob = object.observer().cloned();
    if let Some(ob) = &ob {
        if ob.root_count() > 0 {
            return Err(MutationError::RootDataDelete { key: key.to_string() });
        }
    }

    let Some(slot) = object.remove_slot(key) else {
        return Ok(());
    };
    let Some(ob) = ob else {
        return Ok(());
    };

    if let Slot::Reactive(cell) = slot {
        cell.dep().notify();
    }
    ob.dep().notify();
    Ok(())
}

/// Read every nested property of `value` so the active watcher depends on
/// all of them. Each container is visited once per walk.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Array(array) => {
            if !seen.insert(array.addr()) {
                return;
            }
            for item in array.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        Value::Object(object) => {
            if object.is_frozen() || !seen.insert(object.addr()) {
                return;
            }
            for (_, item) in object.entries() {
                traverse_inner(&item, seen);
            }
        }
        _ => {}
    }
}
