//! Reactive Context
//!
//! The reactive context tracks which watcher is currently evaluating.
//! This enables automatic dependency tracking: when a reactive property is
//! read, the dependency subscribes the current watcher.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Entering an evaluation pushes the
//! watcher; the returned guard pops it when dropped, so a watcher evaluated
//! while another one is active hands control back to the outer watcher
//! afterwards, even if the getter panics.
//!
//! A frame may also be empty ([`untracked`]), which hides the outer watcher
//! for the duration of a callback.

use std::cell::RefCell;

use super::watcher::{Watcher, WatcherId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    watcher_id: Option<WatcherId>,
}

impl ReactiveContext {
    /// Make `watcher` the active watcher until the guard is dropped.
    pub fn enter(watcher: &Watcher) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Some(watcher.clone())));
        Self {
            watcher_id: Some(watcher.id()),
        }
    }

    /// Push a frame with no active watcher.
    pub fn enter_untracked() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(None));
        Self { watcher_id: None }
    }

    /// Check if a watcher is currently collecting dependencies.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the active watcher, if any.
    pub fn current() -> Option<Watcher> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Number of frames on the stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.as_ref().map(Watcher::id),
                self.watcher_id,
                "ReactiveContext mismatch"
            );
        }
    }
}

/// Run `f` without an active watcher; reads inside it are not tracked.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}
