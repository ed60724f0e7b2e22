//! Update Scheduling
//!
//! Two queues sit between a mutation and the work it causes:
//!
//! - [`WatcherQueue`] batches invalidated watchers so each runs once per
//!   flush, parents before children.
//! - [`TickQueue`] defers callbacks (including the flush itself) until the
//!   current synchronous task is over.

mod queue;
mod tick;

pub use queue::{FlushStats, WatcherQueue};
pub use tick::TickQueue;
