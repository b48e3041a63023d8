//! Event managers: broadcast one event to a list of handlers.
//!
//! The manager is a gen-server whose state is the handler list. Handlers run
//! on the manager's thread in registration order. A handler that returns an
//! error or panics is logged and reported, and stays installed; the other
//! handlers still see the event.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kestrel_core::{ActorError, ActorId, CallError, ExitReason, MailboxError};
use log::{error, trace};

use super::gen_server::{self, guarded, GenServer, GenServerRef, ReplyTo, ServerContext};
use crate::actor::{ActorSystem, AnyActorRef, SpawnOptions};

type HandlerFn<E> = dyn Fn(&E) -> Result<(), ActorError> + Send + Sync;

/// A handler function. Clones compare equal; distinct closures never do.
pub struct EventHandler<E> {
    handler: Arc<HandlerFn<E>>,
}

impl<E> EventHandler<E> {
    /// Wrap `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&E) -> Result<(), ActorError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    fn handle(&self, event: &E) -> Result<(), ActorError> {
        (self.handler)(event)
    }
}

impl<E> Clone for EventHandler<E> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<E> PartialEq for EventHandler<E> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl<E> Eq for EventHandler<E> {}

impl<E> fmt::Debug for EventHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Arc::as_ptr(&self.handler) as *const ())
    }
}

/// One handler failure during a notification.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Position of the handler in registration order
    pub index: usize,
    /// What went wrong
    pub error: ActorError,
}

/// Outcome of [`EventManager::sync_notify`].
#[derive(Debug, Clone, Default)]
pub struct NotifyReport {
    /// Handlers that ran without error
    pub delivered: usize,
    /// Handlers that failed
    pub failures: Vec<HandlerFailure>,
}

impl NotifyReport {
    /// True when every handler succeeded.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

enum EventCall<E> {
    Notify(E),
    Add(EventHandler<E>),
    Remove(EventHandler<E>),
    Count,
}

enum EventReply {
    Report(NotifyReport),
    Added,
    Removed(bool),
    Count(usize),
}

struct Manager<E> {
    handlers: Vec<EventHandler<E>>,
}

impl<E> Manager<E> {
    fn dispatch(&self, manager: ActorId, event: &E) -> NotifyReport {
        let mut report = NotifyReport::default();
        for (index, handler) in self.handlers.iter().enumerate() {
            match guarded(|| handler.handle(event)) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    error!("Event handler {} of manager {} failed: {}", index, manager, err);
                    report.failures.push(HandlerFailure { index, error: err });
                }
            }
        }
        trace!(
            "Manager {} delivered event to {}/{} handlers",
            manager,
            report.delivered,
            self.handlers.len()
        );
        report
    }
}

impl<E: Send + 'static> GenServer for Manager<E> {
    type Call = EventCall<E>;
    type Cast = E;
    type Info = ();
    type Reply = EventReply;

    fn handle_call(
        &mut self,
        request: EventCall<E>,
        reply: ReplyTo<EventReply>,
        ctx: &mut ServerContext<'_, Self>,
    ) -> Result<(), ActorError> {
        let answer = match request {
            EventCall::Notify(event) => EventReply::Report(self.dispatch(ctx.id(), &event)),
            EventCall::Add(handler) => {
                if !self.handlers.contains(&handler) {
                    self.handlers.push(handler);
                }
                EventReply::Added
            }
            EventCall::Remove(handler) => {
                let before = self.handlers.len();
                self.handlers.retain(|h| *h != handler);
                EventReply::Removed(self.handlers.len() != before)
            }
            EventCall::Count => EventReply::Count(self.handlers.len()),
        };
        reply.reply(answer);
        Ok(())
    }

    fn handle_cast(&mut self, event: E, ctx: &mut ServerContext<'_, Self>) -> Result<(), ActorError> {
        self.dispatch(ctx.id(), &event);
        Ok(())
    }
}

fn unexpected_reply() -> CallError {
    CallError::Failed(Arc::new(ActorError::failed("unexpected event manager reply")))
}

/// Handle to a running event manager.
pub struct EventManager<E: Send + 'static> {
    server: GenServerRef<Manager<E>>,
}

impl<E: Send + 'static> EventManager<E> {
    /// Start an anonymous manager with no handlers.
    pub fn start(system: &ActorSystem) -> Result<Self, ActorError> {
        Self::start_with(system, SpawnOptions::new())
    }

    /// Start a manager with `options`, e.g. to register it under a name.
    pub fn start_with(system: &ActorSystem, options: SpawnOptions) -> Result<Self, ActorError> {
        let server = gen_server::start_with(
            system,
            Manager {
                handlers: Vec::new(),
            },
            options,
        )?;
        Ok(Self { server })
    }

    /// The manager's id.
    pub fn id(&self) -> ActorId {
        self.server.id()
    }

    /// Erase the message type.
    pub fn into_any(self) -> AnyActorRef {
        self.server.into_any()
    }

    /// Broadcast `event` without waiting.
    pub fn notify(&self, event: E) -> Result<(), MailboxError> {
        self.server.cast(event)
    }

    /// Broadcast `event` and wait until every handler has run.
    pub fn sync_notify(&self, event: E) -> Result<NotifyReport, CallError> {
        match self.server.call(EventCall::Notify(event))? {
            EventReply::Report(report) => Ok(report),
            _ => Err(unexpected_reply()),
        }
    }

    /// Like [`sync_notify`](Self::sync_notify) with an explicit timeout.
    pub fn sync_notify_timeout(&self, event: E, timeout: Duration) -> Result<NotifyReport, CallError> {
        match self.server.call_timeout(EventCall::Notify(event), timeout)? {
            EventReply::Report(report) => Ok(report),
            _ => Err(unexpected_reply()),
        }
    }

    /// Append a handler. Adding a handler that is already installed is a
    /// no-op.
    pub fn add_handler(&self, handler: EventHandler<E>) -> Result<(), CallError> {
        match self.server.call(EventCall::Add(handler))? {
            EventReply::Added => Ok(()),
            _ => Err(unexpected_reply()),
        }
    }

    /// Remove `handler`. Returns false if it was not installed.
    pub fn remove_handler(&self, handler: &EventHandler<E>) -> Result<bool, CallError> {
        match self.server.call(EventCall::Remove(handler.clone()))? {
            EventReply::Removed(removed) => Ok(removed),
            _ => Err(unexpected_reply()),
        }
    }

    /// Number of installed handlers.
    pub fn handlers_count(&self) -> Result<usize, CallError> {
        match self.server.call(EventCall::Count)? {
            EventReply::Count(count) => Ok(count),
            _ => Err(unexpected_reply()),
        }
    }

    /// Stop the manager after the events already queued.
    pub fn shutdown(&self) -> Result<(), MailboxError> {
        self.server.shutdown()
    }

    /// Whether the manager is running.
    pub fn is_alive(&self) -> bool {
        self.server.is_alive()
    }

    /// Wait up to `timeout` for the manager to terminate.
    pub fn join(&self, timeout: Duration) -> Option<ExitReason> {
        self.server.join(timeout)
    }
}

impl<E: Send + 'static> Clone for EventManager<E> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
        }
    }
}

impl<E: Send + 'static> fmt::Debug for EventManager<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("id", &self.server.id())
            .finish()
    }
}
