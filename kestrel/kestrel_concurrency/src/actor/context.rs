//! The running actor's view of itself.

use std::any::Any;
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use kestrel_core::{ActorError, ActorId, WatchToken};

use super::actor_ref::ActorRef;
use super::mailbox::{Mailbox, Signal};
use super::receive::Receive;
use super::system::{ActorSystem, SpawnOptions};

thread_local! {
    static CURRENT_ACTOR: Cell<Option<ActorId>> = const { Cell::new(None) };
}

/// Id of the actor running on the current thread, if any.
pub fn current_actor() -> Option<ActorId> {
    CURRENT_ACTOR.with(|cell| cell.get())
}

pub(crate) fn set_current_actor(id: Option<ActorId>) {
    CURRENT_ACTOR.with(|cell| cell.set(id));
}

/// Handed to an actor's entry function; only the actor itself holds it.
///
/// Receiving, trapping exits and the user state cell are reachable only
/// through this context, so there is never more than one receiver per
/// mailbox.
pub struct Context<M: Send + 'static> {
    system: ActorSystem,
    myself: ActorRef<M>,
    state: Option<Box<dyn Any + Send>>,
}

impl<M: Send + 'static> Context<M> {
    pub(crate) fn new(system: ActorSystem, myself: ActorRef<M>) -> Self {
        Self {
            system,
            myself,
            state: None,
        }
    }

    /// Handle to this actor.
    pub fn myself(&self) -> &ActorRef<M> {
        &self.myself
    }

    /// This actor's id.
    pub fn id(&self) -> ActorId {
        self.myself.id()
    }

    /// The system this actor runs in.
    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    fn mailbox(&self) -> &Arc<Mailbox<M>> {
        self.myself.mailbox()
    }

    /// Start a selective receive.
    pub fn receive<'a, R>(&self) -> Receive<'a, M, R> {
        Receive::new(Arc::clone(self.mailbox()))
    }

    /// Wait for the next signal of any kind.
    pub fn recv(&self) -> Result<Signal<M>, ActorError> {
        self.receive().any(|signal| signal).run()
    }

    /// Wait up to `timeout` for the next signal of any kind.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Signal<M>>, ActorError> {
        self.receive().any(Some).after(timeout, || None).run()
    }

    /// Deliver link exit signals as messages instead of raising them.
    pub fn trap_exits(&self, trap: bool) {
        self.mailbox().set_trap_exits(trap);
    }

    /// Whether link exit signals are delivered as messages.
    pub fn is_trapping(&self) -> bool {
        self.mailbox().is_trapping()
    }

    /// Link this actor with `other`.
    pub fn link(&self, other: ActorId) {
        self.system.link(self.id(), other);
    }

    /// Remove the link with `other`, if any.
    pub fn unlink(&self, other: ActorId) {
        self.system.unlink(self.id(), other);
    }

    /// Watch `other`; its termination arrives as an exit message carrying the
    /// returned token.
    pub fn watch(&self, other: ActorId) -> WatchToken {
        self.system.watch(self.id(), other)
    }

    /// Drop the watch edge identified by `token`.
    pub fn unwatch(&self, other: ActorId, token: WatchToken) -> bool {
        self.system.unwatch(self.id(), other, token)
    }

    /// Spawn an actor linked to this one before it starts running.
    pub fn spawn_link<N, F>(&self, options: SpawnOptions, entry: F) -> Result<ActorRef<N>, ActorError>
    where
        N: Send + 'static,
        F: FnOnce(&mut Context<N>) -> Result<(), ActorError> + Send + 'static,
    {
        self.system.spawn_with(options.link_to(self.id()), entry)
    }

    /// Replace the user state.
    pub fn set_state<T: Any + Send>(&mut self, state: T) {
        self.state = Some(Box::new(state));
    }

    /// Borrow the user state if it has type `T`.
    pub fn state<T: Any + Send>(&self) -> Option<&T> {
        self.state.as_ref().and_then(|s| s.downcast_ref::<T>())
    }

    /// Mutably borrow the user state if it has type `T`.
    pub fn state_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.state.as_mut().and_then(|s| s.downcast_mut::<T>())
    }

    /// Take the user state out if it has type `T`.
    pub fn take_state<T: Any + Send>(&mut self) -> Option<T> {
        match self.state.take()?.downcast::<T>() {
            Ok(state) => Some(*state),
            Err(other) => {
                self.state = Some(other);
                None
            }
        }
    }
}
