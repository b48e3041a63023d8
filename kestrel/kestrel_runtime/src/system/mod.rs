//! System management for the Kestrel runtime
//!
//! This module provides configuration loading, logging bootstrap and
//! shutdown reporting.

pub mod bootstrap;
pub mod config;
pub mod shutdown;

// Re-export key types for convenience
pub use bootstrap::init_logging;
pub use config::{ConfigError, RuntimeConfig};
pub use shutdown::ShutdownError;
