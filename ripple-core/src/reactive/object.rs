//! Reactive Objects
//!
//! A `ReactiveObject` is an insertion-ordered map of named properties. Until
//! it is observed, every property is plain storage. Observing it converts
//! each existing property into a [`ReactiveCell`] and attaches an
//! [`Observer`] whose dependency stands for the object's shape.
//!
//! Properties inserted later with [`ReactiveObject::insert`] stay plain: the
//! sanctioned way to add a reactive property is [`set`](super::set).

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use indexmap::IndexMap;

use super::cell::ReactiveCell;
use super::context::ReactiveContext;
use super::observer::Observer;
use super::value::Value;

/// Storage for one property.
#[derive(Clone)]
pub(crate) enum Slot {
    Plain(Value),
    Reactive(Rc<ReactiveCell<Value>>),
}

impl Slot {
    fn read(&self) -> Value {
        match self {
            Slot::Plain(value) => value.clone(),
            Slot::Reactive(cell) => cell.get(),
        }
    }

    fn read_untracked(&self) -> Value {
        match self {
            Slot::Plain(value) => value.clone(),
            Slot::Reactive(cell) => cell.get_untracked(),
        }
    }
}

/// A shared handle to a map of properties.
#[derive(Clone, Default)]
pub struct ReactiveObject(Rc<ObjectInner>);

#[derive(Default)]
struct ObjectInner {
    props: RefCell<IndexMap<String, Slot>>,
    observer: OnceCell<Observer>,
    frozen: Cell<bool>,
    raw: Cell<bool>,
}

impl ReactiveObject {
    /// Create an empty, unobserved object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &ReactiveObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared allocation; stable for the object's lifetime.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Read a property.
    ///
    /// Reactive properties subscribe the active watcher to the property.
    /// Missing and plain properties subscribe it to the object's shape, so a
    /// later [`set`](super::set) of that key is seen.
    pub fn get(&self, key: &str) -> Option<Value> {
        let slot = self.0.props.borrow().get(key).cloned();
        match slot {
            Some(Slot::Reactive(cell)) => Some(cell.get()),
            Some(Slot::Plain(value)) => {
                self.depend_shape();
                Some(value)
            }
            None => {
                self.depend_shape();
                None
            }
        }
    }

    /// Read a property without tracking.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        self.0.props.borrow().get(key).map(Slot::read_untracked)
    }

    /// Plain assignment.
    ///
    /// Existing reactive properties go through their setter and notify.
    /// A key that does not exist yet is stored as a plain property and is
    /// not reactive.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let cell = match self.0.props.borrow().get(&key) {
            Some(Slot::Reactive(cell)) => Some(cell.clone()),
            _ => None,
        };
        match cell {
            Some(cell) => {
                cell.set(value);
            }
            None => {
                self.0.props.borrow_mut().insert(key, Slot::Plain(value));
            }
        }
    }

    /// Whether the key exists. Tracks the object's shape.
    pub fn contains_key(&self, key: &str) -> bool {
        self.depend_shape();
        self.0.props.borrow().contains_key(key)
    }

    /// Property names in insertion order. Tracks the object's shape.
    pub fn keys(&self) -> Vec<String> {
        self.depend_shape();
        self.0.props.borrow().keys().cloned().collect()
    }

    /// Number of properties. Tracks the object's shape.
    pub fn len(&self) -> usize {
        self.depend_shape();
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read every property, tracking each one.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.depend_shape();
        let slots: Vec<(String, Slot)> = self
            .0
            .props
            .borrow()
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        slots.into_iter().map(|(k, s)| (k, s.read())).collect()
    }

    /// Read every property without tracking.
    pub fn entries_untracked(&self) -> Vec<(String, Value)> {
        self.0
            .props
            .borrow()
            .iter()
            .map(|(k, s)| (k.clone(), s.read_untracked()))
            .collect()
    }

    /// Whether the property is backed by a reactive cell.
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(self.0.props.borrow().get(key), Some(Slot::Reactive(_)))
    }

    /// The cell behind a reactive property.
    pub fn cell(&self, key: &str) -> Option<Rc<ReactiveCell<Value>>> {
        match self.0.props.borrow().get(key) {
            Some(Slot::Reactive(cell)) => Some(cell.clone()),
            _ => None,
        }
    }

    /// Prevent this object from ever being observed.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    /// Mark this object as explicitly non-reactive.
    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    /// The observer attached to this object, if it has been observed.
    pub fn observer(&self) -> Option<&Observer> {
        self.0.observer.get()
    }

    pub fn is_observed(&self) -> bool {
        self.0.observer.get().is_some()
    }

    pub(crate) fn attach_observer(&self) -> &Observer {
        self.0.observer.get_or_init(Observer::new)
    }

    /// Names of properties that are still plain storage.
    pub(crate) fn plain_keys(&self) -> Vec<String> {
        self.0
            .props
            .borrow()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Plain(_)))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Replace (or create) `key` with a reactive cell.
    pub(crate) fn install_cell(&self, key: String, cell: Rc<ReactiveCell<Value>>) {
        self.0.props.borrow_mut().insert(key, Slot::Reactive(cell));
    }

    /// Remove a property, returning its slot.
    pub(crate) fn remove_slot(&self, key: &str) -> Option<Slot> {
        self.0.props.borrow_mut().shift_remove(key)
    }

    pub(crate) fn has_own(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    fn depend_shape(&self) {
        if !ReactiveContext::is_active() {
            return;
        }
        if let Some(ob) = self.observer() {
            ob.dep().depend();
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ReactiveObject {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let props = iter
            .into_iter()
            .map(|(k, v)| (k.into(), Slot::Plain(v)))
            .collect();
        Self(Rc::new(ObjectInner {
            props: RefCell::new(props),
            ..ObjectInner::default()
        }))
    }
}

impl Debug for ReactiveObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("addr", &self.addr())
            .field("keys", &self.0.props.borrow().keys().collect::<Vec<_>>())
            .field("observed", &self.is_observed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe;
    use serde_json::json;

    fn object(json: serde_json::Value) -> ReactiveObject {
        match Value::from_json(json) {
            Value::Object(o) => o,
            other => panic!("expected object, got {}", other.type_name()),
        }
    }

    #[test]
    fn unobserved_object_is_plain_storage() {
        let obj = object(json!({ "a": 1 }));
        assert!(!obj.is_observed());
        assert!(!obj.is_reactive("a"));

        obj.insert("a", Value::from(2));
        assert_eq!(obj.get("a"), Some(Value::from(2)));
    }

    #[test]
    fn observing_converts_existing_properties() {
        let obj = object(json!({ "a": 1, "b": { "c": true } }));
        observe(&Value::Object(obj.clone()), false);

        assert!(obj.is_observed());
        assert!(obj.is_reactive("a"));
        assert!(obj.is_reactive("b"));

        let nested = obj.get("b").unwrap();
        assert!(nested.as_object().unwrap().is_reactive("c"));
    }

    #[test]
    fn insert_of_new_key_stays_plain() {
        let obj = object(json!({ "a": 1 }));
        observe(&Value::Object(obj.clone()), false);

        obj.insert("z", Value::from(3));
        assert!(!obj.is_reactive("z"));
        assert_eq!(obj.get_untracked("z"), Some(Value::from(3)));
        assert_eq!(obj.keys(), vec!["a".to_string(), "z".to_string()]);
    }
}
