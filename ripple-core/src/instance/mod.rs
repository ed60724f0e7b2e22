//! Owning Instances
//!
//! An [`Instance`] is the component-like context that state is declared on.
//! It owns:
//!
//! - a root data object, observed as root data
//! - a props object whose properties are reactive
//! - named computed values
//! - every watcher created on its behalf (render, computed, user)
//!
//! Watchers refer back to their instance weakly; the instance keeps them
//! alive until [`Instance::destroy`]. Closures handed to an instance may
//! capture clones of it; destroying the instance releases those cycles.
//!
//! Children are created after their parent, so their watchers get higher
//! ids and run after the parent's watchers in a flush.

mod state;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::reactive::{observe, Getter, ReactiveObject, Runtime, Value, Watcher, WatcherId};

/// A named owning context for reactive state and watchers.
#[derive(Clone)]
pub struct Instance(Rc<InstanceInner>);

pub(crate) struct InstanceInner {
    name: String,
    runtime: Runtime,
    parent: Option<Weak<InstanceInner>>,

    data: RefCell<ReactiveObject>,
    data_initialized: Cell<bool>,
    props: ReactiveObject,
    computed: RefCell<IndexMap<String, ComputedEntry>>,

    watchers: RefCell<Vec<Watcher>>,
    render: RefCell<Option<Watcher>>,
    being_destroyed: Cell<bool>,
}

#[derive(Clone)]
enum ComputedEntry {
    /// Backed by a lazy watcher.
    Cached(Watcher),
    /// Re-runs the getter on every read.
    Uncached(Getter),
}

impl Instance {
    /// Create an instance. The root data starts as an empty object.
    pub fn new(runtime: &Runtime, name: impl Into<String>, parent: Option<&Instance>) -> Self {
        let data = ReactiveObject::new();
        observe(&Value::Object(data.clone()), true);

        let instance = Instance(Rc::new(InstanceInner {
            name: name.into(),
            runtime: runtime.clone(),
            parent: parent.map(Instance::downgrade),
            data: RefCell::new(data),
            data_initialized: Cell::new(false),
            props: ReactiveObject::new(),
            computed: RefCell::new(IndexMap::new()),
            watchers: RefCell::new(Vec::new()),
            render: RefCell::new(None),
            being_destroyed: Cell::new(false),
        }));
        tracing::debug!(
            name = %instance.name(),
            root = instance.is_root(),
            "instance created"
        );
        instance
    }

    /// Create a child of this instance.
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self::new(&self.0.runtime, name, Some(self))
    }

    pub(crate) fn from_inner(inner: Rc<InstanceInner>) -> Self {
        Instance(inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<InstanceInner> {
        Rc::downgrade(&self.0)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    /// The parent instance, if any and still alive.
    pub fn parent(&self) -> Option<Instance> {
        self.0
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Instance)
    }

    /// Whether this instance was created without a parent.
    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The root data object.
    pub fn data(&self) -> ReactiveObject {
        self.0.data.borrow().clone()
    }

    /// The props object.
    pub fn props(&self) -> ReactiveObject {
        self.0.props.clone()
    }

    /// Create the render watcher. A previous one is torn down.
    pub fn mount<F>(&self, render: F) -> Watcher
    where
        F: Fn() -> Result<Value, crate::error::BoxError> + 'static,
    {
        if let Some(previous) = self.0.render.borrow_mut().take() {
            previous.teardown();
        }
        let watcher = Watcher::render(&self.0.runtime, Some(self), render);
        *self.0.render.borrow_mut() = Some(watcher.clone());
        tracing::debug!(name = %self.name(), id = watcher.id().raw(), "instance mounted");
        watcher
    }

    /// The render watcher, if mounted.
    pub fn render_watcher(&self) -> Option<Watcher> {
        self.0.render.borrow().clone()
    }

    /// Number of live watchers owned by this instance.
    pub fn watcher_count(&self) -> usize {
        self.0.watchers.borrow().len()
    }

    pub fn is_being_destroyed(&self) -> bool {
        self.0.being_destroyed.get()
    }

    /// Tear down every owned watcher and release the root data.
    ///
    /// Idempotent.
    pub fn destroy(&self) {
        if self.0.being_destroyed.replace(true) {
            return;
        }

        let watchers = std::mem::take(&mut *self.0.watchers.borrow_mut());
        for watcher in &watchers {
            watcher.teardown();
        }
        self.0.render.borrow_mut().take();
        self.0.computed.borrow_mut().clear();

        if let Some(ob) = self.0.data.borrow().observer() {
            ob.release_root();
        }

        tracing::debug!(name = %self.name(), watchers = watchers.len(), "instance destroyed");
    }

    pub(crate) fn push_watcher(&self, watcher: Watcher) {
        self.0.watchers.borrow_mut().push(watcher);
    }

    pub(crate) fn remove_watcher(&self, id: WatcherId) {
        let mut watchers = self.0.watchers.borrow_mut();
        if let Some(pos) = watchers.iter().position(|w| w.id() == id) {
            watchers.swap_remove(pos);
        }
    }

    fn warn(&self, message: &str) {
        self.0.runtime.warn(message, Some(self.name()));
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.0.name)
            .field("root", &self.is_root())
            .field("watchers", &self.watcher_count())
            .field("being_destroyed", &self.is_being_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn children_know_their_parent() {
        let runtime = Runtime::new();
        let parent = Instance::new(&runtime, "App", None);
        let child = parent.child("Item");

        assert!(parent.is_root());
        assert!(!child.is_root());
        assert!(child.parent().unwrap().ptr_eq(&parent));
    }

    #[test]
    fn child_watchers_get_higher_ids() {
        let runtime = Runtime::new();
        let parent = Instance::new(&runtime, "App", None);
        let parent_render = parent.mount(|| Ok(Value::Null));
        let child = parent.child("Item");
        let child_render = child.mount(|| Ok(Value::Null));

        assert!(parent_render.id() < child_render.id());
    }

    #[test]
    fn destroy_tears_everything_down() {
        let runtime = Runtime::new();
        let instance = Instance::new(&runtime, "App", None);
        instance.init_data(Value::from_json(json!({ "count": 1 })));

        let handle = instance.clone();
        let render = instance.mount(move || Ok(handle.get("count").unwrap_or_default()));
        let _unwatch = instance.watch("count", |_: &Value, _: &Value| Ok(()), Default::default());
        assert_eq!(instance.watcher_count(), 2);

        let cell = instance.data().cell("count").unwrap();
        assert_eq!(cell.subscriber_count(), 2);

        instance.destroy();
        instance.destroy();

        assert!(instance.is_being_destroyed());
        assert!(!render.is_active());
        assert_eq!(instance.watcher_count(), 0);
        assert_eq!(cell.subscriber_count(), 0);
        assert_eq!(instance.data().observer().unwrap().root_count(), 0);
    }

    #[test]
    fn unwatch_leaves_the_watcher_list() {
        let runtime = Runtime::new();
        let instance = Instance::new(&runtime, "App", None);
        instance.init_data(Value::from_json(json!({ "a": 1 })));

        let unwatch = instance.watch("a", |_: &Value, _: &Value| Ok(()), Default::default());
        assert_eq!(instance.watcher_count(), 1);
        unwatch.unwatch();
        unwatch.unwatch();
        assert_eq!(instance.watcher_count(), 0);
    }

    #[test]
    fn remounting_replaces_render_watcher() {
        let runtime = Runtime::new();
        let instance = Instance::new(&runtime, "App", None);
        let first = instance.mount(|| Ok(Value::from(1)));
        let second = instance.mount(|| Ok(Value::from(2)));

        assert!(!first.is_active());
        assert_eq!(instance.render_watcher().unwrap().id(), second.id());
        assert_eq!(instance.watcher_count(), 1);
    }
}
