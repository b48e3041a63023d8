//! # Kestrel Core
//!
//! `kestrel_core` provides the vocabulary shared by every Kestrel crate:
//! identifiers, exit signals, mailbox and supervision settings, and the
//! error hierarchy.
//!
//! ## Core Principles
//!
//! 1. **Isolated actors**: an actor owns its state and is reached only through
//!    its mailbox. Nothing in this crate hands out shared mutable state.
//!
//! 2. **Failures are values**: an actor terminates with an [`ExitReason`].
//!    Links and watches turn that reason into an [`Exit`] signal for the
//!    actors that asked to hear about it.
//!
//! 3. **Let it crash**: errors are not swallowed. They terminate the actor that
//!    raised them and travel along links until a supervisor decides to restart
//!    or escalate.
//!
//! ## Crate Structure
//!
//! - **error**: Error types for all Kestrel components
//! - **id**: Strongly-typed identifier types
//! - **types**: Exit signals, mailbox settings and supervision settings
//! - **utils**: Logging helpers

pub mod error;
pub mod id;
pub mod types;
pub mod utils;

// Re-export key types for convenience
pub use error::{
    ActorError, CallError, Error, MailboxError, RegistryError, Result, SupervisionError,
};
pub use id::{ActorId, RequestId, WatchToken};
pub use types::{Exit, ExitReason, MailboxConfig, OverflowPolicy, RestartMode, RestartStrategy};
pub use utils::LogLevel;
