//! Actors, mailboxes and supervision.
//!
//! This module provides the core actor model for Kestrel:
//!
//! - Mailboxes with selective receive and overflow policies
//! - Links, watches and exit trapping
//! - A name registry
//! - Supervisors with restart strategies and limits

pub mod actor_ref;
pub mod context;
mod link;
pub mod mailbox;
pub mod receive;
mod registry;
pub mod supervisor;
pub mod system;

pub use actor_ref::{ActorRef, AnyActorRef};
pub use context::{current_actor, Context};
pub use mailbox::{EntryState, Mailbox, Signal};
pub use receive::Receive;
pub use supervisor::{
    ChildBuilder, ChildInfo, ChildSpec, Supervisor, SupervisorMsg, SupervisorRef, SupervisorSpec,
};
pub use system::{ActorSystem, ActorSystemConfig, SpawnOptions};

pub(crate) use system::panic_message;
