//! Reactive Arrays
//!
//! Arrays do not get per-index dependencies. Instead every mutating
//! operation performs the change, observes any inserted elements, and then
//! notifies the array's shape dependency. Reads through the handle track
//! that same dependency.
//!
//! Unobserved arrays behave like a shared `Vec<Value>`.

use std::cell::{Cell, OnceCell, RefCell};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::rc::Rc;

use crate::error::MutationError;

use super::context::ReactiveContext;
use super::observer::{self, Observer};
use super::value::Value;

/// A shared handle to a growable list of values.
#[derive(Clone, Default)]
pub struct ReactiveArray(Rc<ArrayInner>);

#[derive(Default)]
struct ArrayInner {
    items: RefCell<Vec<Value>>,
    observer: OnceCell<Observer>,
    raw: Cell<bool>,
}

impl ReactiveArray {
    /// Create an empty, unobserved array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether both handles refer to the same array.
    pub fn ptr_eq(&self, other: &ReactiveArray) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared allocation; stable for the array's lifetime.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn len(&self) -> usize {
        self.depend_shape();
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.depend_shape();
        self.0.items.borrow().get(index).cloned()
    }

    /// Copy of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.depend_shape();
        self.0.items.borrow().clone()
    }

    /// Copy of the current elements, without tracking.
    pub fn to_vec_untracked(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    pub fn push(&self, value: Value) -> usize {
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.push(value.clone());
            items.len()
        };
        self.after_mutation(&[value]);
        len
    }

    pub fn pop(&self) -> Option<Value> {
        let popped = self.0.items.borrow_mut().pop();
        self.after_mutation(&[]);
        popped
    }

    pub fn shift(&self) -> Option<Value> {
        let shifted = {
            let mut items = self.0.items.borrow_mut();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        self.after_mutation(&[]);
        shifted
    }

    pub fn unshift(&self, values: Vec<Value>) -> usize {
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.splice(0..0, values.iter().cloned());
            items.len()
        };
        self.after_mutation(&values);
        len
    }

    /// Remove `delete_count` elements starting at `start` and insert `values`
    /// in their place. Out-of-range arguments are clamped.
    pub fn splice(&self, start: usize, delete_count: usize, values: Vec<Value>) -> Vec<Value> {
        let removed = {
            let mut items = self.0.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            let removed: Vec<Value> = items.splice(start..end, values.iter().cloned()).collect();
            removed
        };
        self.after_mutation(&values);
        removed
    }

    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        // the comparator may read this array, so sort outside the borrow
        let mut items = self.0.items.borrow().clone();
        items.sort_by(compare);
        *self.0.items.borrow_mut() = items;
        self.after_mutation(&[]);
    }

    pub fn reverse(&self) {
        self.0.items.borrow_mut().reverse();
        self.after_mutation(&[]);
    }

    /// Replace the element at `index`, padding with `Null` when the index is
    /// past the end.
    ///
    /// Fails without changing anything when the array cannot grow that far.
    pub fn set_index(&self, index: usize, value: Value) -> Result<(), MutationError> {
        {
            let mut items = self.0.items.borrow_mut();
            let len = items.len();
            if index >= len {
                let additional = (index - len).saturating_add(1);
                if items.try_reserve(additional).is_err() {
                    return Err(MutationError::IndexOutOfRange { index, len });
                }
                items.resize(index, Value::Null);
            }
        }
        self.splice(index, 1, vec![value]);
        Ok(())
    }

    /// Remove the element at `index`, if any.
    pub fn remove_index(&self, index: usize) -> Option<Value> {
        self.splice(index, 1, Vec::new()).into_iter().next()
    }

    /// Prevent this array from ever being observed.
    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    /// The observer attached to this array, if it has been observed.
    pub fn observer(&self) -> Option<&Observer> {
        self.0.observer.get()
    }

    pub fn is_observed(&self) -> bool {
        self.0.observer.get().is_some()
    }

    pub(crate) fn attach_observer(&self) -> &Observer {
        self.0.observer.get_or_init(Observer::new)
    }

    fn after_mutation(&self, inserted: &[Value]) {
        let Some(ob) = self.observer() else {
            return;
        };
        observer::observe_all(inserted);
        ob.dep().notify();
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

impl FromIterator<Value> for ReactiveArray {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(Rc::new(ArrayInner {
            items: RefCell::new(iter.into_iter().collect()),
            ..ArrayInner::default()
        }))
    }
}

impl Debug for ReactiveArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveArray")
            .field("addr", &self.addr())
            .field("len", &self.0.items.borrow().len())
            .field("observed", &self.is_observed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe;

    fn numbers(values: &[i32]) -> ReactiveArray {
        values.iter().copied().map(Value::from).collect()
    }

    #[test]
    fn splice_clamps_range() {
        let array = numbers(&[1, 2, 3]);
        let removed = array.splice(1, 10, vec![Value::from(9)]);

        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(array.to_vec(), vec![Value::from(1), Value::from(9)]);
    }

    #[test]
    fn set_index_pads_with_null() {
        let array = numbers(&[1]);
        array.set_index(3, Value::from(4)).unwrap();
        assert_eq!(
            array.to_vec(),
            vec![Value::from(1), Value::Null, Value::Null, Value::from(4)]
        );
    }

    #[test]
    fn set_index_past_capacity_leaves_array_alone() {
        let array = numbers(&[1, 2]);
        let err = array.set_index(usize::MAX, Value::from(3)).unwrap_err();
        assert_eq!(err, MutationError::IndexOutOfRange { index: usize::MAX, len: 2 });
        assert_eq!(array.to_vec(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn comparator_may_read_the_array() {
        let array = numbers(&[3, 1, 2]);
        let reader = array.clone();
        array.sort_by(|a, b| {
            assert_eq!(reader.len(), 3);
            assert!(reader.get(0).is_some());
            a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
        });
        assert_eq!(array.to_vec(), vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn shift_and_unshift() {
        let array = numbers(&[2, 3]);
        assert_eq!(array.unshift(vec![Value::from(0), Value::from(1)]), 4);
        assert_eq!(array.shift(), Some(Value::from(0)));
        assert_eq!(array.len(), 3);
        assert_eq!(ReactiveArray::new().shift(), None);
    }

    #[test]
    fn pushed_elements_are_observed() {
        let array = numbers(&[]);
        observe(&Value::Array(array.clone()), false);

        let child = Value::from_json(serde_json::json!({ "x": 1 }));
        array.push(child.clone());
        assert!(child.as_object().unwrap().is_observed());
    }

    #[test]
    fn unobserved_array_mutations_do_not_observe() {
        let array = numbers(&[]);
        let child = Value::from_json(serde_json::json!({ "x": 1 }));
        array.push(child.clone());
        assert!(!child.as_object().unwrap().is_observed());
    }
}
