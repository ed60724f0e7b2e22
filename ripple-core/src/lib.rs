//! Ripple Core
//!
//! This crate provides a fine-grained reactive runtime. It implements:
//!
//! - Dependency tracking on observed state (objects, arrays, typed cells)
//! - Watchers: render effects, lazy computed values and explicit watches
//! - A batching scheduler that runs each invalidated watcher once per tick
//! - Component-like instances that own state and watchers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: dependencies, observed values, watchers and the runtime
//! - `scheduler`: the watcher queue and the next-tick queue
//! - `instance`: owning contexts for data, props, computed values and watches
//! - `config`, `error`: runtime configuration and error types
//!
//! # Example
//!
//! ```rust
//! use ripple_core::instance::Instance;
//! use ripple_core::reactive::{Runtime, Value};
//!
//! let runtime = Runtime::new();
//! let app = Instance::new(&runtime, "App", None);
//! app.init_data(Value::from_json(serde_json::json!({ "count": 1 })));
//!
//! let handle = app.clone();
//! let render = app.mount(move || Ok(handle.get("count").unwrap_or_default()));
//!
//! app.assign("count", Value::from(2));
//! app.assign("count", Value::from(3));
//!
//! // both writes are flushed together
//! runtime.run_ticks();
//! assert_eq!(render.value(), Value::from(3));
//! assert_eq!(render.evaluation_count(), 2);
//! app.destroy();
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod reactive;
pub mod scheduler;

pub use config::Config;
pub use error::{BoxError, ConfigError, MutationError, ReactiveError};
pub use instance::Instance;
pub use reactive::{Runtime, Value};
