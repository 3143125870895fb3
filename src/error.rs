use thiserror::Error;

use crate::engine::OrderToken;

pub use anyhow::Error as RuntimeError;

/// Result returned by fallible task functions.
pub type TaskResult<T> = anyhow::Result<T, anyhow::Error>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Task {token} does not exist, only {len} tasks are registered")]
    OutOfRange { token: OrderToken, len: usize },

    #[error("Task {token} produces `{found}`, but `{expected}` was requested")]
    TypeMismatch {
        token: OrderToken,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Task {token}:\n{source}")]
    Task {
        token: OrderToken,
        #[source]
        source: RuntimeError,
    },

    #[error("Task {token} panicked: {message}")]
    Panicked { token: OrderToken, message: String },
}

impl SchedulerError {
    /// The task this error originated from.
    pub fn token(&self) -> OrderToken {
        match self {
            SchedulerError::OutOfRange { token, .. }
            | SchedulerError::TypeMismatch { token, .. }
            | SchedulerError::Task { token, .. }
            | SchedulerError::Panicked { token, .. } => *token,
        }
    }
}

#[cfg(feature = "logging")]
#[derive(Debug, Error)]
#[error("Couldn't install the global tracing subscriber.\n{0}")]
pub struct LoggingError(#[from] pub(crate) Box<dyn std::error::Error + Send + Sync>);
