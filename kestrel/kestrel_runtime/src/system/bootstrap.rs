//! Logging bootstrap
//!
//! Installs a `tracing` fmt subscriber for the process. Records emitted
//! through the `log` facade by the library crates are bridged into it.

use anyhow::Result;
use kestrel_core::LogLevel;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Calling this again once a subscriber is installed is a no-op.
pub fn init_logging(level: LogLevel) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
    {
        Ok(()) => debug!("Logging initialized at {}", level),
        Err(e) => debug!("Logging already initialized: {}", e),
    }
    Ok(())
}
