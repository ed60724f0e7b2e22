//! Watcher Implementation
//!
//! A Watcher wraps a getter, evaluates it while recording every dependency
//! it reads, and reacts when one of those dependencies is notified.
//!
//! # Kinds
//!
//! - `Render`: re-evaluated through the scheduler; has no callback.
//! - `Computed`: lazy. Notification only marks it dirty; the value is
//!   recomputed the next time someone asks for it.
//! - `User`: an explicit watch. Re-evaluated through the scheduler, then the
//!   callback receives `(new, old)` when the value changed.
//!
//! Any non-lazy watcher created with the `sync` option skips the scheduler
//! and re-runs inline when notified.
//!
//! # Dependency Bookkeeping
//!
//! Every evaluation collects a fresh dependency set. On exit the watcher
//! unsubscribes from dependencies it did not read this time and keeps the
//! rest, so a watcher never hears about state it no longer looks at.
//!
//! # Lifecycle
//!
//! Torn-down watchers are terminal: they ignore notifications, and a run
//! that was already queued becomes a no-op.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::{BoxError, ReactiveError};
use crate::instance::{Instance, InstanceInner};

use super::context::{untracked, ReactiveContext};
use super::dep::{Dep, DepId};
use super::observer::traverse;
use super::runtime::Runtime;
use super::value::{SameValue, Value};

/// Unique, creation-ordered identifier for a watcher.
///
/// Flushes run watchers in ascending id order, so parents (created first)
/// run before their children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate the next watcher ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a watcher is for; decides how it reacts to notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherKind {
    Render,
    Computed,
    User { expression: String },
}

impl WatcherKind {
    pub fn is_lazy(&self) -> bool {
        matches!(self, WatcherKind::Computed)
    }

    pub fn is_user(&self) -> bool {
        matches!(self, WatcherKind::User { .. })
    }

    /// Where a runaway update loop was detected, for the circular-update
    /// diagnostic.
    pub fn loop_location(&self) -> String {
        match self {
            WatcherKind::User { expression } => {
                format!("in watcher with expression \"{expression}\"")
            }
            _ => "in a component render function".to_string(),
        }
    }
}

impl fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherKind::Render => f.write_str("render function"),
            WatcherKind::Computed => f.write_str("computed getter"),
            WatcherKind::User { expression } => write!(f, "watcher \"{expression}\""),
        }
    }
}

/// Options for explicit watches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Also depend on every nested property of the value.
    pub deep: bool,
    /// Re-run inline on notification instead of through the scheduler.
    pub sync: bool,
    /// Invoke the callback once at creation with the initial value.
    pub immediate: bool,
}

impl WatchOptions {
    pub fn deep() -> Self {
        Self {
            deep: true,
            ..Self::default()
        }
    }

    pub fn sync() -> Self {
        Self {
            sync: true,
            ..Self::default()
        }
    }

    pub fn immediate() -> Self {
        Self {
            immediate: true,
            ..Self::default()
        }
    }
}

/// A fallible expression evaluated by a watcher.
pub type Getter = Rc<dyn Fn() -> Result<Value, BoxError>>;

/// A watch callback, invoked with `(new, old)`.
pub type Callback = Rc<dyn Fn(&Value, &Value) -> Result<(), BoxError>>;

/// What a watcher evaluates.
#[derive(Clone)]
pub enum WatchSource {
    Getter(Getter),
    /// A dot-separated path such as `"user.name"` or `"items.0"`,
    /// resolved against the owning instance.
    Path(String),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        WatchSource::Getter(Rc::new(f))
    }

    pub fn path(path: impl Into<String>) -> Self {
        WatchSource::Path(path.into())
    }

    fn expression(&self) -> String {
        match self {
            WatchSource::Getter(_) => "function".to_string(),
            WatchSource::Path(path) => path.clone(),
        }
    }
}

impl From<&str> for WatchSource {
    fn from(path: &str) -> Self {
        WatchSource::Path(path.to_string())
    }
}

impl From<String> for WatchSource {
    fn from(path: String) -> Self {
        WatchSource::Path(path)
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Getter(_) => f.write_str("Getter(..)"),
            WatchSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// An effect: re-evaluates a getter when the state it read changes.
///
/// Cloning a `Watcher` yields another handle to the same effect.
#[derive(Clone)]
pub struct Watcher(Rc<WatcherInner>);

pub(crate) struct WatcherInner {
    id: WatcherId,
    kind: WatcherKind,
    runtime: Runtime,
    owner: Option<Weak<InstanceInner>>,
    getter: Getter,
    callback: Option<Callback>,
    deep: bool,
    sync: bool,

    active: Cell<bool>,
    dirty: Cell<bool>,
    value: RefCell<Value>,
    evaluations: Cell<usize>,

    /// Dependencies read during the last completed evaluation.
    deps: RefCell<IndexMap<DepId, Dep>>,
    /// Dependencies read during the evaluation in progress.
    new_deps: RefCell<IndexMap<DepId, Dep>>,
}

impl Watcher {
    /// Create a watcher.
    ///
    /// Non-lazy watchers are evaluated immediately to collect their initial
    /// dependencies; computed watchers start dirty and evaluate on demand.
    /// The watcher is registered with `owner`, which keeps it alive; a
    /// watcher without an owner lives as long as one of its handles.
    pub fn new(
        runtime: &Runtime,
        owner: Option<&Instance>,
        source: WatchSource,
        callback: Option<Callback>,
        kind: WatcherKind,
        options: WatchOptions,
    ) -> Self {
        let getter = match source {
            WatchSource::Getter(getter) => getter,
            WatchSource::Path(path) => path_getter(runtime, owner, &path),
        };
        let lazy = kind.is_lazy();

        let watcher = Watcher(Rc::new(WatcherInner {
            id: WatcherId::new(),
            kind,
            runtime: runtime.clone(),
            owner: owner.map(Instance::downgrade),
            getter,
            callback,
            deep: options.deep,
            sync: options.sync,
            active: Cell::new(true),
            dirty: Cell::new(lazy),
            value: RefCell::new(Value::Null),
            evaluations: Cell::new(0),
            deps: RefCell::new(IndexMap::new()),
            new_deps: RefCell::new(IndexMap::new()),
        }));

        if let Some(owner) = owner {
            owner.push_watcher(watcher.clone());
        }

        if !lazy {
            if let Ok(value) = watcher.get() {
                *watcher.0.value.borrow_mut() = value;
            }
        }

        tracing::trace!(id = watcher.id().raw(), kind = %watcher.kind(), "watcher created");
        watcher
    }

    /// Create a render watcher.
    pub fn render<F>(runtime: &Runtime, owner: Option<&Instance>, render: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        Self::new(
            runtime,
            owner,
            WatchSource::getter(render),
            None,
            WatcherKind::Render,
            WatchOptions::default(),
        )
    }

    /// Create a lazy (computed) watcher.
    pub fn computed<F>(runtime: &Runtime, owner: Option<&Instance>, getter: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        Self::new(
            runtime,
            owner,
            WatchSource::getter(getter),
            None,
            WatcherKind::Computed,
            WatchOptions::default(),
        )
    }

    /// Create a user watcher. `immediate` is honored by the callers that
    /// hand out [`Unwatch`] handles.
    pub fn user(
        runtime: &Runtime,
        owner: Option<&Instance>,
        source: WatchSource,
        callback: Callback,
        options: WatchOptions,
    ) -> Self {
        let kind = WatcherKind::User {
            expression: source.expression(),
        };
        Self::new(runtime, owner, source, Some(callback), kind, options)
    }

    pub(crate) fn from_inner(inner: Rc<WatcherInner>) -> Self {
        Watcher(inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<WatcherInner> {
        Rc::downgrade(&self.0)
    }

    pub fn id(&self) -> WatcherId {
        self.0.id
    }

    pub fn kind(&self) -> &WatcherKind {
        &self.0.kind
    }

    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    /// The owning instance, if it is still alive.
    pub fn owner(&self) -> Option<Instance> {
        self.0
            .owner
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Instance::from_inner)
    }

    fn owner_name(&self) -> Option<String> {
        self.owner().map(|owner| owner.name().to_string())
    }

    /// Last computed value.
    pub fn value(&self) -> Value {
        self.0.value.borrow().clone()
    }

    /// Whether a lazy watcher needs re-evaluation.
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    /// Whether the watcher has not been torn down.
    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    /// How many times the getter has been invoked.
    pub fn evaluation_count(&self) -> usize {
        self.0.evaluations.get()
    }

    /// Number of dependencies held from the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.0.deps.borrow().len()
    }

    /// Whether the last evaluation read `dep`.
    pub fn depends_on(&self, dep: &Dep) -> bool {
        self.0.deps.borrow().contains_key(&dep.id())
    }

    /// Evaluate the getter, collecting dependencies.
    ///
    /// Errors are reported to the runtime's error channel before being
    /// returned. The stored value is not touched; callers decide what to
    /// do with the result.
    pub fn get(&self) -> Result<Value, ReactiveError> {
        self.0.evaluations.set(self.0.evaluations.get() + 1);

        let result = {
            let _ctx = ReactiveContext::enter(self);
            let result = (self.0.getter)();
            if self.0.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.cleanup_deps();

        result.map_err(|source| {
            let err = ReactiveError::Evaluation {
                watcher: self.0.kind.to_string(),
                source,
            };
            self.0.runtime.report(&err, self.owner_name().as_deref());
            err
        })
    }

    /// Record `dep` as read during the current evaluation.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let is_new = {
            let mut new_deps = self.0.new_deps.borrow_mut();
            if new_deps.contains_key(&id) {
                false
            } else {
                new_deps.insert(id, dep.clone());
                true
            }
        };
        if is_new && !self.0.deps.borrow().contains_key(&id) {
            dep.add_sub(self);
        }
    }

    /// Swap in the dependencies of the evaluation that just finished,
    /// unsubscribing from the ones that were not read.
    fn cleanup_deps(&self) {
        let mut deps = self.0.deps.borrow_mut();
        let mut new_deps = self.0.new_deps.borrow_mut();

        for (id, dep) in deps.iter() {
            if !new_deps.contains_key(id) {
                dep.remove_sub(self.0.id);
            }
        }

        std::mem::swap(&mut *deps, &mut *new_deps);
        new_deps.clear();
    }

    /// Invalidation entry point, called by [`Dep::notify`].
    pub fn update(&self) {
        if !self.is_active() {
            return;
        }
        if self.0.kind.is_lazy() {
            self.0.dirty.set(true);
        } else if self.0.sync {
            self.run();
        } else {
            self.0.runtime.queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and, if the value changed (or is a container, or the
    /// watch is deep), invoke the callback. Errors are reported, never
    /// propagated.
    pub fn run(&self) {
        if !self.is_active() {
            return;
        }
        let Ok(value) = self.get() else {
            return;
        };

        let changed =
            !value.same_value(&self.0.value.borrow()) || value.is_object() || self.0.deep;
        if !changed {
            return;
        }

        let old = self.0.value.replace(value.clone());
        self.invoke_callback(&value, &old);
    }

    /// Call the callback outside of any tracking context.
    pub(crate) fn invoke_callback(&self, new: &Value, old: &Value) {
        let Some(callback) = self.0.callback.clone() else {
            return;
        };
        if let Err(source) = untracked(|| callback(new, old)) {
            let err = ReactiveError::Callback {
                watcher: self.0.kind.to_string(),
                source,
            };
            self.0.runtime.report(&err, self.owner_name().as_deref());
        }
    }

    /// Recompute a lazy watcher's value if it is dirty.
    pub fn evaluate(&self) {
        if !self.is_dirty() {
            return;
        }
        if let Ok(value) = self.get() {
            *self.0.value.borrow_mut() = value;
        }
        self.0.dirty.set(false);
    }

    /// Let the active watcher depend on everything this watcher depends on.
    ///
    /// Used when a computed value is read from inside another evaluation.
    pub fn depend(&self) {
        let deps: SmallVec<[Dep; 8]> = self.0.deps.borrow().values().cloned().collect();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dependency and leave the owner's watcher list.
    ///
    /// Idempotent. A run that is already queued still happens, as a no-op.
    pub fn teardown(&self) {
        if !self.0.active.replace(false) {
            return;
        }

        if let Some(owner) = self.owner() {
            if !owner.is_being_destroyed() {
                owner.remove_watcher(self.0.id);
            }
        }

        let deps: SmallVec<[Dep; 8]> = self
            .0
            .deps
            .borrow_mut()
            .drain(..)
            .map(|(_, dep)| dep)
            .collect();
        for dep in deps {
            dep.remove_sub(self.0.id);
        }

        tracing::trace!(id = self.0.id.raw(), "watcher torn down");
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("active", &self.is_active())
            .field("dirty", &self.is_dirty())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Handle returned by explicit watches; tears the watcher down.
///
/// A watcher without an owner lives as long as this handle.
#[must_use = "dropping an Unwatch for an owner-less watcher stops the watch"]
pub struct Unwatch {
    watcher: Watcher,
}

impl Unwatch {
    pub(crate) fn new(watcher: Watcher) -> Self {
        Self { watcher }
    }

    /// Stop watching. Calling this more than once is a no-op.
    pub fn unwatch(&self) {
        self.watcher.teardown();
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Turn the handle into a zero-argument closure.
    pub fn into_fn(self) -> impl Fn() {
        move || self.watcher.teardown()
    }
}

impl fmt::Debug for Unwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unwatch").field("watcher", &self.watcher).finish()
    }
}

/// Split a watch path into its segments.
///
/// Only simple dot-delimited paths of word characters and `$` are accepted.
pub fn parse_path(path: &str) -> Option<Vec<String>> {
    let valid = path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.');
    if !valid {
        return None;
    }
    Some(path.split('.').map(str::to_string).collect())
}

fn path_getter(runtime: &Runtime, owner: Option<&Instance>, path: &str) -> Getter {
    let segments = parse_path(path);
    let owner = owner.map(Instance::downgrade);

    let (Some(segments), Some(owner)) = (segments, owner) else {
        runtime.warn(
            &format!(
                "failed watching path \"{path}\": watchers only accept simple \
                 dot-delimited paths on an instance; use a getter instead"
            ),
            None,
        );
        return Rc::new(|| Ok(Value::Null));
    };

    Rc::new(move || {
        let Some(instance) = owner.upgrade().map(Instance::from_inner) else {
            return Ok(Value::Null);
        };
        let mut segments = segments.iter();
        let mut current = match segments.next() {
            Some(first) => instance.get(first).unwrap_or_default(),
            None => return Ok(Value::Null),
        };
        for segment in segments {
            current = match &current {
                Value::Object(object) => object.get(segment).unwrap_or_default(),
                Value::Array(array) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| array.get(index))
                    .unwrap_or_default(),
                _ => return Ok(Value::Null),
            };
        }
        Ok(current)
    })
}
