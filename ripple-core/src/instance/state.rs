//! State declaration on an instance: data, props, computed values, watches
//! and the sanctioned mutation helpers.

use std::rc::Rc;

use crate::error::{BoxError, ReactiveError};
use crate::reactive::{
    define_reactive, del, observe, set, without_conversion, PropKey, ReactiveContext, Unwatch,
    Value, WatchOptions, WatchSource, Watcher,
};

use super::{ComputedEntry, Instance};

/// Prop names that belong to the host and cannot be used as props.
const RESERVED_PROPS: [&str; 3] = ["key", "ref", "slot"];

impl Instance {
    /// Install the root data.
    ///
    /// `data` must be an object; anything else is replaced by an empty
    /// object with a warning. Keys already declared as props are not
    /// reachable through [`get`](Instance::get) and produce a warning.
    /// Root data can only be installed once.
    pub fn init_data(&self, data: Value) {
        if self.0.data_initialized.replace(true) {
            self.warn("avoid replacing instance root data; use nested data properties instead");
            return;
        }

        let object = match data {
            Value::Object(object) => object,
            other => {
                self.warn(&format!(
                    "data should be an object, got {}",
                    other.type_name()
                ));
                Default::default()
            }
        };

        for key in object.keys() {
            if self.0.props.has_own(&key) {
                self.warn(&format!(
                    "the data property \"{key}\" is already declared as a prop; \
                     use the prop default value instead"
                ));
            }
        }

        let previous = self.0.data.replace(object.clone());
        if let Some(ob) = previous.observer() {
            ob.release_root();
        }
        observe(&Value::Object(object), true);
    }

    /// Declare props.
    ///
    /// Every prop becomes a reactive property of the props object. Values
    /// given to a root instance are observed; values handed to a child keep
    /// whatever observation state they already have.
    pub fn init_props<K, I>(&self, props: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let define = || {
            for (key, value) in props {
                let key = key.into();
                if RESERVED_PROPS.contains(&key.as_str()) {
                    self.warn(&format!(
                        "\"{key}\" is a reserved attribute and cannot be used as a prop"
                    ));
                }
                define_reactive(&self.0.props, key, value);
            }
        };

        if self.is_root() {
            define();
        } else {
            without_conversion(define);
        }
    }

    /// Push new prop values from the parent. Unknown keys are ignored.
    pub fn update_props<K, I>(&self, props: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let apply = || {
            for (key, value) in props {
                let key = key.into();
                match self.0.props.cell(&key) {
                    Some(cell) => {
                        cell.set(value);
                    }
                    None => self.warn(&format!("\"{key}\" is not a declared prop")),
                }
            }
        };

        if self.is_root() {
            apply();
        } else {
            without_conversion(apply);
        }
    }

    /// Define a computed value.
    ///
    /// With `cache` the value is backed by a lazy watcher and only
    /// recomputed after one of its dependencies changed. Without it the
    /// getter runs on every read.
    pub fn define_computed<F>(&self, name: impl Into<String>, cache: bool, getter: F)
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        let name = name.into();
        if self.0.props.has_own(&name) || self.0.data.borrow().has_own(&name) {
            self.warn(&format!(
                "the computed property \"{name}\" shadows a data property or prop"
            ));
        }

        let entry = if cache {
            ComputedEntry::Cached(Watcher::computed(&self.0.runtime, Some(self), getter))
        } else {
            ComputedEntry::Uncached(Rc::new(getter))
        };
        self.0.computed.borrow_mut().insert(name, entry);
    }

    pub fn has_computed(&self, name: &str) -> bool {
        self.0.computed.borrow().contains_key(name)
    }

    /// Read a computed value.
    ///
    /// A cached computed is re-evaluated when dirty; the active watcher then
    /// inherits its dependencies.
    pub fn computed(&self, name: &str) -> Option<Value> {
        let entry = self.0.computed.borrow().get(name).cloned()?;
        let value = match entry {
            ComputedEntry::Cached(watcher) => {
                watcher.evaluate();
                if ReactiveContext::is_active() {
                    watcher.depend();
                }
                watcher.value()
            }
            ComputedEntry::Uncached(getter) => getter().unwrap_or_else(|source| {
                let err = ReactiveError::Evaluation {
                    watcher: format!("computed \"{name}\""),
                    source,
                };
                self.0.runtime.report(&err, Some(self.name()));
                Value::Null
            }),
        };
        Some(value)
    }

    /// Resolve a name the way templates do: computed values, then props,
    /// then data.
    pub fn get(&self, key: &str) -> Option<Value> {
        if self.has_computed(key) {
            return self.computed(key);
        }
        if self.0.props.has_own(key) {
            return self.0.props.get(key);
        }
        self.data().get(key)
    }

    /// Plain assignment to a prop or data property.
    ///
    /// Mutating a prop on a child instance is allowed but warned about,
    /// since the parent will overwrite it.
    pub fn assign(&self, key: &str, value: Value) {
        if self.has_computed(key) {
            self.warn(&format!("computed property \"{key}\" has no setter"));
            return;
        }
        if self.0.props.has_own(key) {
            if !self.is_root() {
                self.warn(&format!(
                    "avoid mutating a prop directly since the value will be overwritten \
                     whenever the parent re-renders; prop being mutated: \"{key}\""
                ));
            }
            self.0.props.insert(key, value);
            return;
        }
        self.data().insert(key, value);
    }

    /// Watch a path or getter, calling `callback(new, old)` on change.
    ///
    /// With `immediate` the callback runs right away with the initial
    /// value. The watcher belongs to this instance; the returned handle
    /// tears it down early.
    pub fn watch<C>(
        &self,
        source: impl Into<WatchSource>,
        callback: C,
        options: WatchOptions,
    ) -> Unwatch
    where
        C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
    {
        let immediate = options.immediate;
        let watcher = Watcher::user(
            &self.0.runtime,
            Some(self),
            source.into(),
            Rc::new(callback),
            options,
        );
        if immediate {
            watcher.invoke_callback(&watcher.value(), &Value::Null);
        }
        Unwatch::new(watcher)
    }

    /// Reactively set `key` on `target`, returning `value`. See
    /// [`set`](crate::reactive::set).
    ///
    /// A refused change is reported as a warning and leaves `target` as it
    /// was.
    pub fn set(&self, target: &Value, key: impl Into<PropKey>, value: Value) -> Value {
        if let Err(err) = set(target, key, value.clone()) {
            self.warn(&err.to_string());
        }
        value
    }

    /// Reactively delete `key` from `target`. See [`del`](crate::reactive::del).
    pub fn delete(&self, target: &Value, key: impl Into<PropKey>) {
        if let Err(err) = del(target, key) {
            self.warn(&err.to_string());
        }
    }
}
