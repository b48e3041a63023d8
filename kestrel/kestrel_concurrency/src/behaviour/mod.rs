//! Standard behaviours built on actors.
//!
//! - [`gen_server`]: request/reply servers
//! - [`gen_event`]: event managers broadcasting to handlers

pub mod gen_event;
pub mod gen_server;

pub use gen_event::{EventHandler, EventManager, HandlerFailure, NotifyReport};
pub use gen_server::{GenServer, GenServerRef, Info, ReplyTo, ServerContext, ServerMsg};
