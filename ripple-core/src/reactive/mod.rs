//! Reactive Engine
//!
//! This module implements dependency tracking and change propagation:
//! dependencies, observed state, and watchers.
//!
//! # Concepts
//!
//! ## Dependencies
//!
//! A [`Dep`] stands for one observable thing: a property, or the shape of an
//! object or array. Reading it while a watcher evaluates subscribes that
//! watcher; writing it notifies every subscriber.
//!
//! ## Observed State
//!
//! [`observe`] instruments a [`Value`] tree in place. Object properties
//! become [`ReactiveCell`]s, arrays notify on mutation, and every container
//! gets an [`Observer`] carrying its shape dependency. Typed state that does
//! not need the dynamic model can use a `ReactiveCell<T>` directly.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a getter and records what it read. Render and
//! user watchers are re-run through the scheduler when their dependencies
//! change; computed watchers are lazy and only marked dirty.
//!
//! # Implementation Notes
//!
//! Tracking uses a thread-local stack of active watchers
//! ([`ReactiveContext`]). Dependencies hold their subscribers weakly, so a
//! watcher that is dropped simply stops being notified.

mod array;
mod cell;
mod context;
mod dep;
mod object;
mod observer;
mod runtime;
mod value;
mod watcher;

pub use array::ReactiveArray;
pub use cell::ReactiveCell;
pub use context::{untracked, ReactiveContext};
pub use dep::{Dep, DepId};
pub use object::ReactiveObject;
pub use observer::{
    define_reactive, del, depend_array, observe, observe_all, set, should_convert, traverse,
    without_conversion, Observer,
};
pub use runtime::{ErrorHandler, Runtime, WarnHandler};
pub use value::{Opaque, PropKey, SameValue, Value};
pub use watcher::{
    parse_path, Callback, Getter, Unwatch, WatchOptions, WatchSource, Watcher, WatcherId,
    WatcherKind,
};
