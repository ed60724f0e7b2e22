//! Value Model
//!
//! `Value` is the dynamic data that reactive containers hold. Primitives are
//! stored inline; objects and arrays are reference-counted handles, so
//! cloning a `Value` that holds a container aliases the same container.
//!
//! # Equality
//!
//! [`SameValue`] decides whether a write actually changed anything:
//!
//! - containers and opaque values compare by handle identity, so replacing
//!   a property with a distinct but deeply-equal object still notifies
//! - numbers compare with `==`, except that `NaN` is the same as `NaN`
//! - everything else compares by value

use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::array::ReactiveArray;
use super::object::ReactiveObject;
use super::observer;

/// Equality and nesting hooks used by [`ReactiveCell`](super::ReactiveCell).
pub trait SameValue {
    /// Whether writing `other` over `self` would be a no-op.
    fn same_value(&self, other: &Self) -> bool;

    /// Called on reads inside an evaluation: let the active watcher also
    /// depend on nested container dependencies.
    fn depend_children(&self) {}

    /// Called on writes: observe a newly stored nested value.
    fn observe_children(&self) {}
}

macro_rules! same_value_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_by_eq!(
    bool, char, (), i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
    &'static str,
);

impl SameValue for f64 {
    fn same_value(&self, other: &Self) -> bool {
        self == other || (self.is_nan() && other.is_nan())
    }
}

impl SameValue for f32 {
    fn same_value(&self, other: &Self) -> bool {
        self == other || (self.is_nan() && other.is_nan())
    }
}

impl<T: ?Sized> SameValue for Rc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }

    fn depend_children(&self) {
        if let Some(value) = self {
            value.depend_children();
        }
    }

    fn observe_children(&self) {
        if let Some(value) = self {
            value.observe_children();
        }
    }
}

/// A value that is never instrumented: host objects, class instances, or
/// anything else that should be stored as-is.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for Opaque {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Opaque({:p})", Rc::as_ptr(&self.0))
    }
}

/// A dynamic reactive value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(ReactiveArray),
    Object(ReactiveObject),
    Opaque(Opaque),
}

impl Value {
    /// Whether this value is a container (object or array).
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ReactiveArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Value::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Build an unobserved value tree from JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => Value::Array(ReactiveArray::from_iter(
                items.into_iter().map(Value::from_json),
            )),
            serde_json::Value::Object(map) => Value::Object(ReactiveObject::from_iter(
                map.into_iter().map(|(k, v)| (k, Value::from_json(v))),
            )),
        }
    }

    /// Untracked JSON snapshot. Opaque values become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl SameValue for Value {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.same_value(b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn depend_children(&self) {
        match self {
            Value::Object(object) => {
                if let Some(ob) = object.observer() {
                    ob.dep().depend();
                }
            }
            Value::Array(array) => {
                if let Some(ob) = array.observer() {
                    ob.dep().depend();
                }
                observer::depend_array(array);
            }
            _ => {}
        }
    }

    fn observe_children(&self) {
        observer::observe(self, false);
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(a) => a.fmt(f),
            Value::Object(o) => o.fmt(f),
            Value::Opaque(o) => o.fmt(f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Opaque(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(array) => {
                let items = array.to_vec_untracked();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(object) => {
                let entries = object.entries_untracked();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in &entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<ReactiveObject> for Value {
    fn from(o: ReactiveObject) -> Self {
        Value::Object(o)
    }
}

impl From<ReactiveArray> for Value {
    fn from(a: ReactiveArray) -> Self {
        Value::Array(a)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Value::Opaque(o)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Key for [`set`](super::set) and [`del`](super::del): an array index or an
/// object property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Index(usize),
    Name(String),
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        PropKey::Index(index)
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Name(name.to_string())
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::Name(name)
    }
}

impl std::fmt::Display for PropKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropKey::Index(i) => write!(f, "{i}"),
            PropKey::Name(n) => f.write_str(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_is_same_as_nan() {
        assert!(f64::NAN.same_value(&f64::NAN));
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        assert!(!Value::Number(1.0).same_value(&Value::Number(2.0)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Value::from_json(json!({ "x": 1 }));
        let b = Value::from_json(json!({ "x": 1 }));

        assert!(a.same_value(&a.clone()));
        assert!(!a.same_value(&b));
    }

    #[test]
    fn mixed_variants_differ() {
        assert!(!Value::from(0).same_value(&Value::Null));
        assert!(!Value::from("1").same_value(&Value::from(1)));
        assert!(Value::from("a").same_value(&Value::from("a".to_string())));
    }

    #[test]
    fn json_snapshot_matches_input() {
        let input = json!({ "name": "ripple", "tags": ["a", "b"], "nested": { "n": 2.5 } });
        let value = Value::from_json(input.clone());
        assert_eq!(value.to_json(), input);
    }

    #[test]
    fn opaque_values_downcast() {
        struct Handle(u8);
        let opaque = Opaque::new(Handle(7));
        let value = Value::from(opaque.clone());

        let handle = value.as_opaque().and_then(|o| o.downcast_ref::<Handle>());
        assert_eq!(handle.map(|h| h.0), Some(7));
        assert!(value.same_value(&Value::Opaque(opaque)));
        assert!(!value.is_object());
    }
}
