//! Error Types
//!
//! Errors raised while evaluating watchers never escape a flush. They are
//! constructed here, handed to the runtime's error channel, and then either
//! swallowed (inside the scheduler) or returned to a direct caller of
//! [`Watcher::get`](crate::reactive::Watcher::get).

use thiserror::Error;

/// Error type returned by user-supplied getters and callbacks.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors reported through the runtime's error channel.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A watcher's getter returned an error.
    #[error("error while evaluating {watcher}: {source}")]
    Evaluation {
        /// Description of the failing watcher.
        watcher: String,
        #[source]
        source: BoxError,
    },

    /// A user watch callback returned an error.
    ///
    /// The watcher's value has already been updated when this is reported.
    #[error("error in callback for {watcher}: {source}")]
    Callback {
        /// Description of the failing watcher.
        watcher: String,
        #[source]
        source: BoxError,
    },

    /// A watcher kept re-queueing itself within a single flush.
    #[error("you may have an infinite update loop {watcher}")]
    CircularUpdate {
        /// Description of the offending watcher.
        watcher: String,
        /// How many times it was re-queued before the flush was aborted.
        count: u32,
    },
}

impl ReactiveError {
    /// Short label used as the `info` argument of the error channel.
    pub fn info(&self) -> &'static str {
        match self {
            ReactiveError::Evaluation { .. } => "getter",
            ReactiveError::Callback { .. } => "callback",
            ReactiveError::CircularUpdate { .. } => "scheduler flush",
        }
    }
}

/// Errors produced while loading a [`Config`](crate::config::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("max_update_count must be at least 1")]
    ZeroUpdateCount,
}

/// A reactive `set`/`del` that was refused.
///
/// Nothing is changed when one of these is returned. [`Instance`] routes
/// them to the runtime's warning channel.
///
/// [`Instance`]: crate::instance::Instance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("cannot add reactive property \"{key}\" to root data at runtime; declare it upfront")]
    RootDataAdd { key: String },

    #[error("avoid deleting property \"{key}\" on root data; set it to null instead")]
    RootDataDelete { key: String },

    /// The key does not fit the target, e.g. a name on an array or any key
    /// on a primitive.
    #[error("cannot reactively change key {key} on a value of type {target_type}")]
    InvalidTarget {
        target_type: &'static str,
        key: String,
    },

    /// The array cannot grow to hold the index.
    #[error("array index {index} is out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_error_keeps_source() {
        let err = ReactiveError::Evaluation {
            watcher: "render function".into(),
            source: "boom".into(),
        };

        assert_eq!(err.to_string(), "error while evaluating render function: boom");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.info(), "getter");
    }

    #[test]
    fn circular_update_message() {
        let err = ReactiveError::CircularUpdate {
            watcher: "in watcher with expression \"count\"".into(),
            count: 101,
        };
        assert!(err.to_string().contains("infinite update loop"));
        assert!(err.to_string().contains("\"count\""));
    }

    #[test]
    fn mutation_errors_name_the_key() {
        let err = MutationError::RootDataAdd { key: "title".into() };
        assert!(err.to_string().contains("\"title\""));

        let err = MutationError::InvalidTarget {
            target_type: "number",
            key: "0".into(),
        };
        assert_eq!(err.to_string(), "cannot reactively change key 0 on a value of type number");
    }
}
