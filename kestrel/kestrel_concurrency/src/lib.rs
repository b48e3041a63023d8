#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Kestrel Concurrency
//!
//! Erlang-style actors for Kestrel.
//!
//! Every actor runs on its own thread and owns a mailbox. Actors receive
//! selectively: patterns are tried against queued messages oldest first, and
//! messages nothing matches stay queued. Actors can be linked, so that one
//! failing takes the other down (or, when it traps exits, tells it), and
//! watched, so that an observer learns when they end.
//!
//! On top of that sit:
//!
//! - **Supervisors** that restart failing children one-for-one, one-for-all
//!   or rest-for-one and give up after too many restarts
//! - **Gen-servers**: call/cast/info servers with at-most-once replies
//! - **Event managers** broadcasting to a list of handlers
//!
//! ## Integration with Other Kestrel Crates
//!
//! - **kestrel_core**: identifiers, exit reasons and error types
//! - **kestrel_runtime**: configuration, logging and the root supervisor

/// Actors, mailboxes, links, registry and supervision
pub mod actor;

/// Gen-server and gen-event behaviours
pub mod behaviour;

// Re-export key types for easier access
pub use actor::{
    current_actor, ActorRef, ActorSystem, ActorSystemConfig, AnyActorRef, ChildSpec, Context,
    Signal, SpawnOptions, Supervisor, SupervisorRef, SupervisorSpec,
};
pub use behaviour::{EventHandler, EventManager, GenServer, GenServerRef, ReplyTo, ServerContext};
