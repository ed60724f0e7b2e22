//! Reactive Runtime
//!
//! The runtime is the service every watcher is bound to. It owns:
//!
//! - the configuration (update-loop threshold, diagnostics)
//! - the error channel that getter, callback and scheduler failures go to
//! - the watcher queue and the next-tick queue
//!
//! # How It Works
//!
//! 1. A reactive write notifies a dependency, which calls `update` on each
//!    subscribed watcher.
//!
//! 2. Lazy watchers only mark themselves dirty. Sync watchers run inline.
//!    Everything else lands in the watcher queue.
//!
//! 3. The first watcher queued in a task defers one flush to the next tick.
//!    The flush runs every queued watcher once, in creation order.
//!
//! # Threading
//!
//! A runtime is single-threaded: handles are `Rc`-based and the tracking
//! context is thread-local. Use one runtime per thread.

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use tokio::sync::oneshot;

use crate::config::Config;
use crate::error::{BoxError, ReactiveError};
use crate::scheduler::{FlushStats, TickQueue, WatcherQueue};

use super::value::Value;
use super::watcher::{Unwatch, WatchOptions, WatchSource, Watcher};

/// Receives `(error, owner name, info)` for every reported failure.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, Option<&str>, &str)>;

/// Receives `(message, owner name)` for every enabled warning.
pub type WarnHandler = Rc<dyn Fn(&str, Option<&str>)>;

/// Handle to a reactive runtime. Clones share the same runtime.
#[derive(Clone)]
pub struct Runtime(Rc<RuntimeInner>);

struct RuntimeInner {
    config: Config,
    error_handler: RefCell<Option<ErrorHandler>>,
    warn_handler: RefCell<Option<WarnHandler>>,
    queue: WatcherQueue,
    ticks: TickQueue,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        tracing::debug!(
            max_update_count = config.max_update_count,
            diagnostics = config.diagnostics,
            "reactive runtime created"
        );
        Self(Rc::new(RuntimeInner {
            config,
            error_handler: RefCell::new(None),
            warn_handler: RefCell::new(None),
            queue: WatcherQueue::new(),
            ticks: TickQueue::new(),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Whether both handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Install the error handler. Without one, errors are logged.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&ReactiveError, Option<&str>, &str) + 'static,
    {
        *self.0.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn clear_error_handler(&self) {
        self.0.error_handler.borrow_mut().take();
    }

    /// Install the warning handler. Without one, warnings are logged.
    pub fn set_warn_handler<F>(&self, handler: F)
    where
        F: Fn(&str, Option<&str>) + 'static,
    {
        *self.0.warn_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Route an error to the handler.
    pub fn report(&self, err: &ReactiveError, owner: Option<&str>) {
        let handler = self.0.error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(err, owner, err.info()),
            None => tracing::error!(
                owner = owner.unwrap_or("<root>"),
                info = err.info(),
                error = %err,
                "reactive error"
            ),
        }
    }

    /// Emit a diagnostic warning, unless warnings are disabled.
    pub fn warn(&self, message: &str, owner: Option<&str>) {
        if !self.0.config.warnings_enabled() {
            return;
        }
        let handler = self.0.warn_handler.borrow().clone();
        match handler {
            Some(handler) => handler(message, owner),
            None => tracing::warn!(owner = owner.unwrap_or("<root>"), "{message}"),
        }
    }

    /// Queue a watcher for the next flush, scheduling one if needed.
    pub fn queue_watcher(&self, watcher: Watcher) {
        if self.0.queue.push(watcher) {
            let runtime = Rc::downgrade(&self.0);
            self.next_tick(move || {
                if let Some(inner) = Weak::upgrade(&runtime) {
                    Runtime(inner).flush();
                }
            });
        }
    }

    /// Whether a flush is scheduled or running.
    pub fn has_pending_flush(&self) -> bool {
        self.0.queue.is_waiting()
    }

    /// Whether `watcher` is queued and has not run yet.
    pub fn is_queued(&self, watcher: &Watcher) -> bool {
        self.0.queue.contains(watcher.id())
    }

    /// Flush the watcher queue now.
    ///
    /// Normally invoked from the tick scheduled by [`queue_watcher`]; a
    /// tick that finds the queue already flushed does nothing.
    ///
    /// [`queue_watcher`]: Runtime::queue_watcher
    pub fn flush(&self) -> FlushStats {
        self.0.queue.flush(self)
    }

    /// Defer `f` until after the current synchronous task.
    pub fn next_tick(&self, f: impl FnOnce() + 'static) {
        self.0.ticks.push(f);
    }

    /// Run every deferred callback, including ones deferred while running.
    pub fn run_ticks(&self) -> usize {
        self.0.ticks.run_pending()
    }

    /// Future that resolves once the callbacks deferred so far have run.
    pub fn tick(&self) -> impl Future<Output = ()> + 'static {
        let (tx, rx) = oneshot::channel();
        self.next_tick(move || {
            let _ = tx.send(());
        });
        async move {
            let _ = rx.await;
        }
    }

    /// Drive deferred callbacks from an async task.
    ///
    /// Must be spawned on a `LocalSet`. Returns once the runtime is dropped.
    pub async fn drive(self) {
        let notify = self.0.ticks.notifier();
        let runtime = Rc::downgrade(&self.0);
        drop(self);

        loop {
            notify.notified().await;
            let Some(inner) = runtime.upgrade() else {
                break;
            };
            Runtime(inner).run_ticks();
        }
        tracing::debug!("tick driver stopped");
    }

    /// Create an owner-less render-style watcher around `getter`.
    ///
    /// The watcher stops once the last handle to it is dropped.
    #[must_use = "an owner-less watcher stops when its last handle is dropped"]
    pub fn effect<F>(&self, getter: F) -> Watcher
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        Watcher::render(self, None, getter)
    }

    /// Create an owner-less lazy watcher.
    ///
    /// The watcher stops once the last handle to it is dropped.
    #[must_use = "an owner-less watcher stops when its last handle is dropped"]
    pub fn computed<F>(&self, getter: F) -> Watcher
    where
        F: Fn() -> Result<Value, BoxError> + 'static,
    {
        Watcher::computed(self, None, getter)
    }

    /// Watch `getter`, calling `callback(new, old)` when its value changes.
    ///
    /// Dropping the returned handle stops the watch.
    pub fn watch<G, C>(&self, getter: G, callback: C, options: WatchOptions) -> Unwatch
    where
        G: Fn() -> Result<Value, BoxError> + 'static,
        C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
    {
        let immediate = options.immediate;
        let watcher = Watcher::user(
            self,
            None,
            WatchSource::getter(getter),
            Rc::new(callback),
            options,
        );
        if immediate {
            watcher.invoke_callback(&watcher.value(), &Value::Null);
        }
        Unwatch::new(watcher)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.0.config)
            .field("queued", &self.0.queue.len())
            .field("ticks", &self.0.ticks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ReactiveCell;
    use std::cell::Cell;

    #[test]
    fn writes_are_batched_until_tick() {
        let runtime = Runtime::new();
        let cell = Rc::new(ReactiveCell::new(1));
        let source = cell.clone();
        let watcher = runtime.effect(move || Ok(Value::from(source.get())));

        cell.set(2);
        cell.set(3);
        assert!(runtime.has_pending_flush());
        assert!(runtime.is_queued(&watcher));
        assert_eq!(watcher.evaluation_count(), 1);

        assert_eq!(runtime.run_ticks(), 1);
        assert_eq!(watcher.evaluation_count(), 2);
        assert_eq!(watcher.value(), Value::from(3));
        assert!(!runtime.has_pending_flush());
    }

    #[test]
    fn immediate_watch_fires_on_creation() {
        let runtime = Runtime::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();

        let _unwatch = runtime.watch(
            || Ok(Value::from(7)),
            move |new: &Value, old: &Value| {
                sink.borrow_mut().push((new.clone(), old.clone()));
                Ok(())
            },
            WatchOptions::immediate(),
        );

        assert_eq!(*seen.borrow(), vec![(Value::from(7), Value::Null)]);
    }

    #[test]
    fn dropping_unwatch_stops_watch() {
        let runtime = Runtime::new();
        let cell = Rc::new(ReactiveCell::new(0));
        let calls = Rc::new(Cell::new(0));

        let (source, sink) = (cell.clone(), calls.clone());
        let unwatch = runtime.watch(
            move || Ok(Value::from(source.get())),
            move |_: &Value, _: &Value| {
                sink.set(sink.get() + 1);
                Ok(())
            },
            WatchOptions::sync(),
        );
        cell.set(1);
        assert_eq!(calls.get(), 1);

        drop(unwatch);
        cell.set(2);
        assert_eq!(calls.get(), 1);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn dropping_an_effect_handle_stops_it() {
        let runtime = Runtime::new();
        let cell = Rc::new(ReactiveCell::new(0));
        let runs = Rc::new(Cell::new(0));

        let (source, counter) = (cell.clone(), runs.clone());
        let effect = runtime.effect(move || {
            counter.set(counter.get() + 1);
            Ok(Value::from(source.get()))
        });
        assert_eq!(runs.get(), 1);

        drop(effect);
        cell.set(1);
        runtime.run_ticks();
        assert_eq!(runs.get(), 1);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn warnings_respect_config() {
        let quiet = Runtime::with_config(Config {
            diagnostics: false,
            ..Config::default()
        });
        let loud = Runtime::with_config(Config {
            diagnostics: true,
            ..Config::default()
        });

        for runtime in [&quiet, &loud] {
            let sink = Rc::new(RefCell::new(Vec::new()));
            let seen = sink.clone();
            runtime.set_warn_handler(move |message, owner| {
                seen.borrow_mut().push(format!("{}: {message}", owner.unwrap_or("-")));
            });
            runtime.warn("careful", Some("App"));
            let expected = if runtime.config().diagnostics { 1 } else { 0 };
            assert_eq!(sink.borrow().len(), expected);
        }
    }

    #[test]
    fn callback_errors_are_reported() {
        let runtime = Runtime::new();
        let infos = Rc::new(RefCell::new(Vec::new()));
        let sink = infos.clone();
        runtime.set_error_handler(move |_, owner, info| {
            assert!(owner.is_none());
            sink.borrow_mut().push(info.to_string());
        });

        let cell = Rc::new(ReactiveCell::new(0));
        let source = cell.clone();
        let _unwatch = runtime.watch(
            move || Ok(Value::from(source.get())),
            |_: &Value, _: &Value| Err("callback failed".into()),
            WatchOptions::default(),
        );

        cell.set(1);
        runtime.run_ticks();
        assert_eq!(*infos.borrow(), vec!["callback".to_string()]);
    }

    #[test]
    fn flush_tick_is_harmless_after_manual_flush() {
        let runtime = Runtime::new();
        let cell = Rc::new(ReactiveCell::new(0));
        let source = cell.clone();
        let watcher = runtime.effect(move || Ok(Value::from(source.get())));

        cell.set(1);
        let stats = runtime.flush();
        assert_eq!(stats.ran, 1);

        runtime.run_ticks();
        assert_eq!(watcher.evaluation_count(), 2);
    }
}
