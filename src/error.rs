//! Recoverable kernel errors.
//!
//! Topology and temporal violations are not represented here: they abort
//! the process. Errors in this module are the ones a caller can act on.

use thiserror::Error;

/// Errors surfaced by engine execution.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("handler {handler} failed at cycle {time}: {reason}")]
    Handler {
        handler: String,
        time: u64,
        reason: String,
    },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

impl SimError {
    /// Convenience constructor for handler failures.
    pub fn handler(handler: impl Into<String>, time: u64, reason: impl Into<String>) -> Self {
        SimError::Handler {
            handler: handler.into(),
            time,
            reason: reason.into(),
        }
    }
}

/// Result type for engine operations.
pub type SimResult<T> = Result<T, SimError>;
