//! Shutdown reporting
//!
//! The runtime stops by shutting down its root supervisor, which stops the
//! children in reverse start order.

use std::time::Duration;

use kestrel_core::ExitReason;
use thiserror::Error;

/// Errors that can occur during shutdown
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The root supervisor did not stop in time and was killed
    #[error("Shutdown timeout after {0:?}")]
    Timeout(Duration),

    /// The root supervisor was killed but did not terminate
    #[error("Root supervisor still running {0:?} after being killed")]
    Unresponsive(Duration),

    /// The root supervisor had already terminated abnormally
    #[error("Root supervisor failed: {0}")]
    RootFailed(ExitReason),
}

impl ShutdownError {
    /// Whether the error reports a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
