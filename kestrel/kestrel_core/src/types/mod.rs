//! Core data types for the Kestrel runtime.
//!
//! This module defines the values that cross actor boundaries: exit
//! signals, mailbox settings and supervision settings.

pub mod exit;
pub mod mailbox;
pub mod supervision;

pub use exit::{Exit, ExitReason};
pub use mailbox::{MailboxConfig, OverflowPolicy};
pub use supervision::{RestartMode, RestartStrategy};
