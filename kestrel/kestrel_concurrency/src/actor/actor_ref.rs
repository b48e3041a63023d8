//! Actor handles.
//!
//! An [`ActorRef`] names an actor and delivers messages to it. It stays valid
//! after the actor terminates: it can still be compared, hashed, logged and
//! asked for the exit reason, while sends report the mailbox as closed.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kestrel_core::{ActorId, Exit, ExitReason, MailboxError};
use parking_lot::{Condvar, Mutex};

use super::context::current_actor;
use super::mailbox::Mailbox;

/// Type-erased delivery of lifecycle signals, used by the link graph.
pub(crate) trait SignalSink: Send + Sync {
    fn deliver_exit(&self, exit: Exit);
    fn deliver_kill(&self, from: ActorId);
}

impl<M: Send> SignalSink for Mailbox<M> {
    fn deliver_exit(&self, exit: Exit) {
        self.push_exit(exit);
    }

    fn deliver_kill(&self, from: ActorId) {
        self.push_kill(from);
    }
}

/// Shared, type-erased part of every actor.
pub(crate) struct ActorCell {
    id: ActorId,
    name: Option<String>,
    sink: Arc<dyn SignalSink>,
    outcome: Mutex<Option<ExitReason>>,
    finished: Condvar,
}

impl ActorCell {
    pub(crate) fn new(id: ActorId, name: Option<String>, sink: Arc<dyn SignalSink>) -> Self {
        Self {
            id,
            name,
            sink,
            outcome: Mutex::new(None),
            finished: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> ActorId {
        self.id
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn sink(&self) -> &dyn SignalSink {
        self.sink.as_ref()
    }

    /// Publish the final outcome and wake joiners. Only the first call counts.
    pub(crate) fn finish(&self, reason: ExitReason) {
        let mut outcome = self.outcome.lock();
        if outcome.is_none() {
            *outcome = Some(reason);
        }
        self.finished.notify_all();
    }

    pub(crate) fn outcome(&self) -> Option<ExitReason> {
        self.outcome.lock().clone()
    }

    pub(crate) fn join(&self, timeout: Option<Duration>) -> Option<ExitReason> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(reason) = outcome.as_ref() {
                return Some(reason.clone());
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    self.finished.wait_until(&mut outcome, deadline);
                }
                None => self.finished.wait(&mut outcome),
            }
        }
    }

    pub(crate) fn signal_exit(&self, reason: ExitReason) {
        let from = current_actor().unwrap_or_else(ActorId::nil);
        if reason.is_kill() {
            self.sink.deliver_kill(from);
        } else {
            self.sink.deliver_exit(Exit::link(from, reason));
        }
    }
}

/// Typed handle to an actor accepting messages of type `M`.
pub struct ActorRef<M> {
    cell: Arc<ActorCell>,
    mailbox: Arc<Mailbox<M>>,
}

impl<M: Send + 'static> ActorRef<M> {
    pub(crate) fn from_parts(cell: Arc<ActorCell>, mailbox: Arc<Mailbox<M>>) -> Self {
        Self { cell, mailbox }
    }

    /// Stable identity of the actor.
    pub fn id(&self) -> ActorId {
        self.cell.id()
    }

    /// Registered name given at spawn, if any.
    pub fn name(&self) -> Option<&str> {
        self.cell.name()
    }

    /// Fire-and-forget send honoring the target's overflow policy.
    pub fn send(&self, message: M) -> Result<(), MailboxError> {
        self.mailbox.push(message)
    }

    /// Same delivery as [`send`](Self::send); additionally yields the current
    /// thread because the caller expects to block on a reply soon.
    pub fn send_sync(&self, message: M) -> Result<(), MailboxError> {
        let result = self.mailbox.push(message);
        thread::yield_now();
        result
    }

    /// Send an exit signal. `Killed` cannot be trapped; any other reason is
    /// raised inside the actor unless it traps exits.
    pub fn exit(&self, reason: ExitReason) {
        self.cell.signal_exit(reason);
    }

    /// Send an untrappable kill.
    pub fn kill(&self) {
        self.exit(ExitReason::Killed);
    }

    /// Whether the actor is still running.
    pub fn is_alive(&self) -> bool {
        self.cell.outcome().is_none()
    }

    /// Exit reason once the actor has terminated.
    pub fn outcome(&self) -> Option<ExitReason> {
        self.cell.outcome()
    }

    /// Wait up to `timeout` for the actor to terminate.
    pub fn join(&self, timeout: Duration) -> Option<ExitReason> {
        self.cell.join(Some(timeout))
    }

    /// Wait for the actor to terminate.
    pub fn wait(&self) -> ExitReason {
        // Without a deadline `join` only returns once an outcome exists.
        self.cell.join(None).unwrap_or(ExitReason::NoProc)
    }

    /// Number of signals queued in the actor's mailbox.
    pub fn mailbox_len(&self) -> usize {
        self.mailbox.len()
    }

    /// Erase the message type.
    pub fn into_any(self) -> AnyActorRef {
        AnyActorRef::from(self)
    }

    pub(crate) fn cell(&self) -> &Arc<ActorCell> {
        &self.cell
    }

    pub(crate) fn mailbox(&self) -> &Arc<Mailbox<M>> {
        &self.mailbox
    }
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

impl<M> PartialEq for ActorRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.cell.id == other.cell.id
    }
}

impl<M> Eq for ActorRef<M> {}

impl<M> Hash for ActorRef<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cell.id.hash(state);
    }
}

impl<M> fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.cell.id)
            .field("name", &self.cell.name)
            .finish()
    }
}

impl<M> fmt::Display for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cell.name {
            Some(name) => write!(f, "{}({})", name, self.cell.id.short()),
            None => write!(f, "<{}>", self.cell.id.short()),
        }
    }
}

/// Handle to an actor whose message type has been erased.
///
/// Used where actors of different types sit side by side: the name
/// registry and supervisor child lists.
#[derive(Clone)]
pub struct AnyActorRef {
    cell: Arc<ActorCell>,
    typed: Arc<dyn Any + Send + Sync>,
}

impl AnyActorRef {
    /// Stable identity of the actor.
    pub fn id(&self) -> ActorId {
        self.cell.id()
    }

    /// Registered name given at spawn, if any.
    pub fn name(&self) -> Option<&str> {
        self.cell.name()
    }

    /// Recover the typed handle.
    pub fn downcast<M: Send + 'static>(&self) -> Option<ActorRef<M>> {
        self.typed.downcast_ref::<ActorRef<M>>().cloned()
    }

    /// Send an exit signal, see [`ActorRef::exit`].
    pub fn exit(&self, reason: ExitReason) {
        self.cell.signal_exit(reason);
    }

    /// Send an untrappable kill.
    pub fn kill(&self) {
        self.exit(ExitReason::Killed);
    }

    /// Whether the actor is still running.
    pub fn is_alive(&self) -> bool {
        self.cell.outcome().is_none()
    }

    /// Exit reason once the actor has terminated.
    pub fn outcome(&self) -> Option<ExitReason> {
        self.cell.outcome()
    }

    /// Wait up to `timeout` for the actor to terminate.
    pub fn join(&self, timeout: Duration) -> Option<ExitReason> {
        self.cell.join(Some(timeout))
    }
}

impl<M: Send + 'static> From<ActorRef<M>> for AnyActorRef {
    fn from(actor: ActorRef<M>) -> Self {
        Self {
            cell: Arc::clone(&actor.cell),
            typed: Arc::new(actor),
        }
    }
}

impl PartialEq for AnyActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.cell.id == other.cell.id
    }
}

impl Eq for AnyActorRef {}

impl fmt::Debug for AnyActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyActorRef")
            .field("id", &self.cell.id)
            .field("name", &self.cell.name)
            .finish()
    }
}
