//! Exit reasons and lifecycle signals.
//!
//! When an actor terminates, every actor linked to it or watching it receives
//! an [`Exit`]: `[:exit, token-or-none, dead-actor, reason]`.

use std::fmt;
use std::sync::Arc;

use crate::error::ActorError;
use crate::id::{ActorId, WatchToken};

/// Why an actor terminated.
#[derive(Debug, Clone)]
pub enum ExitReason {
    /// The entry function returned successfully
    Normal,

    /// The actor was asked to shut down
    Shutdown,

    /// The actor was killed; cannot be trapped
    Killed,

    /// The actor was already gone when a link or watch was requested
    NoProc,

    /// The actor failed
    Error(Arc<ActorError>),
}

impl ExitReason {
    /// Wrap an error as an exit reason.
    pub fn error(err: ActorError) -> Self {
        Self::Error(Arc::new(err))
    }

    /// True for orderly terminations (`Normal` and `Shutdown`).
    ///
    /// Transient children are only restarted when this is false.
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal | Self::Shutdown)
    }

    /// True only for `Killed`.
    pub fn is_kill(&self) -> bool {
        matches!(self, Self::Killed)
    }

    /// The failure cause, if any.
    pub fn cause(&self) -> Option<&ActorError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ActorError> for ExitReason {
    /// An exit signal raised inside a non-trapping actor keeps `Shutdown` and
    /// `Killed` as they are; anything else becomes an abnormal cause.
    fn from(err: ActorError) -> Self {
        if let ActorError::Exit(exit) = &err {
            if matches!(exit.reason, Self::Shutdown | Self::Killed) {
                return exit.reason.clone();
            }
        }
        Self::error(err)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Killed => write!(f, "killed"),
            Self::NoProc => write!(f, "noproc"),
            Self::Error(err) => write!(f, "error: {}", err),
        }
    }
}

/// Lifecycle message delivered when a linked or watched actor terminates.
#[derive(Debug, Clone)]
pub struct Exit {
    /// Watch token for watch notifications, `None` for link signals
    pub token: Option<WatchToken>,

    /// The actor that terminated (or sent the signal)
    pub from: ActorId,

    /// Why it terminated
    pub reason: ExitReason,
}

impl Exit {
    /// A link signal.
    pub fn link(from: ActorId, reason: ExitReason) -> Self {
        Self {
            token: None,
            from,
            reason,
        }
    }

    /// A watch notification for `token`.
    pub fn watch(token: WatchToken, from: ActorId, reason: ExitReason) -> Self {
        Self {
            token: Some(token),
            from,
            reason,
        }
    }

    /// Watch notifications are always delivered as messages.
    pub fn is_watch(&self) -> bool {
        self.token.is_some()
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.token {
            Some(token) => write!(f, "[exit {} {} {}]", token, self.from, self.reason),
            None => write!(f, "[exit nil {} {}]", self.from, self.reason),
        }
    }
}
