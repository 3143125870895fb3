//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `SAKIMONO_LOG` environment variable (e.g. "debug", "sakimono=trace")
//! 2. `RUST_LOG` environment variable
//! 3. default to `info`

use tracing_subscriber::{EnvFilter, fmt};

use crate::error::LoggingError;

/// Installs a global `fmt` subscriber printing the scheduler's events.
///
/// Fails if a global subscriber has already been set.
pub fn init_logging() -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_env("SAKIMONO_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init()?;

    Ok(())
}
