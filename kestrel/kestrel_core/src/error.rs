//! Error types for the Kestrel actor runtime.
//!
//! Errors are organized by subsystem. [`ActorError`] is special: it is the
//! cause an actor terminates with, so it travels inside
//! [`ExitReason::Error`](crate::types::ExitReason) to linked actors and
//! supervisors.
//!
//! The root error type, `Error`, can wrap any of the subsystem-specific
//! errors for uniform handling at the top level.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::id::ActorId;
use crate::types::Exit;

/// Root error type for the Kestrel system.
#[derive(Debug, Error)]
pub enum Error {
    /// An actor failed
    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    /// A message could not be delivered
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    /// Supervisor operations
    #[error("Supervision error: {0}")]
    Supervision(#[from] SupervisionError),

    /// Gen-server calls
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    /// Name registration
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Kestrel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Cause of an actor's abnormal termination.
///
/// Returning one of these from an actor's entry function (usually through `?`
/// on a receive) terminates the actor with it.
#[derive(Debug, Error, Clone)]
pub enum ActorError {
    /// A linked actor terminated (or an exit signal was sent) while this actor
    /// was not trapping exits
    #[error("exit signal from {}: {}", .0.from, .0.reason)]
    Exit(Exit),

    /// A sender overflowed this actor's bounded mailbox under the `throw` policy
    #[error("mailbox overflow: capacity {capacity} exceeded by {}", describe_sender(.sender))]
    MailboxOverflow {
        /// Mailbox capacity
        capacity: usize,
        /// Actor that sent the offending message, if it was sent from an actor
        sender: Option<ActorId>,
    },

    /// The actor's code panicked
    #[error("actor panicked: {0}")]
    Panicked(String),

    /// Application-level failure raised by actor code
    #[error("{0}")]
    Failed(String),

    /// A supervisor gave up
    #[error(transparent)]
    Supervision(#[from] SupervisionError),

    /// The actor could not be started
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    /// Name registration failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ActorError {
    /// Create an application-level failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// The exit signal carried by this error, if it was raised by one.
    pub fn exit(&self) -> Option<&Exit> {
        match self {
            Self::Exit(exit) => Some(exit),
            _ => None,
        }
    }
}

fn describe_sender(sender: &Option<ActorId>) -> String {
    match sender {
        Some(id) => id.to_string(),
        None => "an external sender".to_string(),
    }
}

/// Errors returned to a sender.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailboxError {
    /// The target actor has terminated
    #[error("mailbox of actor {0} is closed")]
    Closed(ActorId),
}

/// Errors related to supervisors.
#[derive(Debug, Error, Clone)]
pub enum SupervisionError {
    /// A child with this id is already supervised
    #[error("duplicate child id: {0}")]
    DuplicateChild(String),

    /// No child with this id
    #[error("child not found: {0}")]
    ChildNotFound(String),

    /// A child restarted too often; the supervisor escalates
    #[error("child {child} exceeded {max_restarts} restarts within {window:?}")]
    RestartLimitExceeded {
        /// Child id
        child: String,
        /// Configured limit
        max_restarts: usize,
        /// Configured window
        window: Duration,
    },

    /// A child failed to start
    #[error("child {child} failed to start: {reason}")]
    StartFailed {
        /// Child id
        child: String,
        /// Builder error
        reason: String,
    },

    /// The supervisor is not running or did not answer
    #[error("supervisor is not available")]
    Unavailable,
}

/// Errors returned by a gen-server call.
#[derive(Debug, Error, Clone)]
pub enum CallError {
    /// No reply arrived in time
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The server terminated before replying
    #[error("server is down")]
    ServerDown,

    /// The server replied with an error, or failed while handling the call
    #[error("call failed: {0}")]
    Failed(Arc<ActorError>),
}

/// Errors related to name registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A live actor is already registered under this name
    #[error("name already registered: {0}")]
    NameTaken(String),
}
