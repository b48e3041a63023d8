//! Mailbox capacity and overflow settings.

use serde::{Deserialize, Serialize};

/// What happens when a message is sent to a full bounded mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Discard the message and raise an overflow error inside the receiver
    Throw,

    /// Silently discard the message
    Drop,

    /// Suspend the sender until space frees up
    Block,
}

/// Capacity and overflow policy of a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Maximum number of queued messages; `None` means unbounded
    #[serde(default)]
    pub capacity: Option<usize>,

    /// Policy applied when `capacity` is reached
    #[serde(default = "default_overflow")]
    pub overflow: OverflowPolicy,
}

fn default_overflow() -> OverflowPolicy {
    OverflowPolicy::Throw
}

impl MailboxConfig {
    /// An unbounded mailbox.
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            overflow: default_overflow(),
        }
    }

    /// A bounded mailbox with the given policy.
    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity),
            overflow,
        }
    }

    /// Whether the mailbox has a capacity limit.
    pub fn is_bounded(&self) -> bool {
        self.capacity.is_some()
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}
