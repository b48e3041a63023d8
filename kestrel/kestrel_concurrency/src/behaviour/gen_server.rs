//! Request/reply servers.
//!
//! A [`GenServer`] is an actor driven by a fixed loop: synchronous calls go
//! to [`GenServer::handle_call`], fire-and-forget casts to
//! [`GenServer::handle_cast`], everything else to [`GenServer::handle_info`].
//! When the mailbox stays idle longer than the timeout set through
//! [`ServerContext::set_timeout`], [`GenServer::handle_timeout`] runs.
//!
//! Every call carries a [`ReplyTo`] that accepts one reply. The handler may
//! answer right away or keep the `ReplyTo` and answer later. If the handler
//! fails instead, the caller receives that failure as
//! [`CallError::Failed`] and the server terminates with it.
//!
//! [`GenServer::terminate`] runs exactly once after the server has started,
//! whatever ends it: a handler error or panic, [`ServerContext::stop`],
//! [`GenServerRef::shutdown`], or an exit signal.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use kestrel_core::{
    ActorError, ActorId, CallError, Exit, ExitReason, MailboxError, RequestId,
};
use log::{debug, error, trace};
use parking_lot::Mutex;

use crate::actor::{
    panic_message, ActorRef, ActorSystem, AnyActorRef, Context, Signal, SpawnOptions,
};

/// Non-call, non-cast input of a server.
#[derive(Debug)]
pub enum Info<I> {
    /// A message sent with [`GenServerRef::info`]
    Message(I),
    /// A watch notification, or a link signal while trapping exits
    Exit(Exit),
}

/// Callbacks of a request/reply server.
pub trait GenServer: Sized + Send + 'static {
    /// Synchronous request type
    type Call: Send + 'static;
    /// Asynchronous request type
    type Cast: Send + 'static;
    /// Out-of-band message type
    type Info: Send + 'static;
    /// Reply type of calls
    type Reply: Send + 'static;

    /// Runs before the server accepts requests. An error aborts the start.
    fn init(&mut self, _ctx: &mut ServerContext<'_, Self>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Handle a call. Answer through `reply`, now or later.
    fn handle_call(
        &mut self,
        request: Self::Call,
        reply: ReplyTo<Self::Reply>,
        ctx: &mut ServerContext<'_, Self>,
    ) -> Result<(), ActorError>;

    /// Handle a cast.
    fn handle_cast(
        &mut self,
        _message: Self::Cast,
        _ctx: &mut ServerContext<'_, Self>,
    ) -> Result<(), ActorError> {
        Ok(())
    }

    /// Handle any other input.
    fn handle_info(
        &mut self,
        _info: Info<Self::Info>,
        _ctx: &mut ServerContext<'_, Self>,
    ) -> Result<(), ActorError> {
        Ok(())
    }

    /// The mailbox stayed idle for the configured timeout.
    fn handle_timeout(&mut self, _ctx: &mut ServerContext<'_, Self>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Clean up. Runs exactly once.
    fn terminate(&mut self, _reason: &ExitReason) {}
}

type ReplySlot<R> = Arc<Mutex<Option<Sender<Result<R, CallError>>>>>;

/// One-shot reply handle of a call.
pub struct ReplyTo<R> {
    request: RequestId,
    slot: ReplySlot<R>,
}

impl<R> ReplyTo<R> {
    fn new(sender: Sender<Result<R, CallError>>) -> Self {
        Self {
            request: RequestId::new(),
            slot: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Id of the request this handle answers.
    pub fn request_id(&self) -> RequestId {
        self.request
    }

    /// Send the reply. Returns false if a reply was already sent or the
    /// caller stopped waiting.
    pub fn reply(&self, value: R) -> bool {
        self.complete(Ok(value))
    }

    /// Answer with an error.
    pub fn reply_error(&self, err: ActorError) -> bool {
        self.complete(Err(CallError::Failed(Arc::new(err))))
    }

    /// Whether a reply has been sent.
    pub fn is_replied(&self) -> bool {
        self.slot.lock().is_none()
    }

    fn complete(&self, result: Result<R, CallError>) -> bool {
        match self.slot.lock().take() {
            Some(sender) => {
                let delivered = sender.send(result).is_ok();
                if !delivered {
                    trace!("Caller of request {} is gone", self.request);
                }
                delivered
            }
            None => false,
        }
    }
}

impl<R> Clone for ReplyTo<R> {
    fn clone(&self) -> Self {
        Self {
            request: self.request,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R> fmt::Debug for ReplyTo<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyTo")
            .field("request", &self.request)
            .field("replied", &self.is_replied())
            .finish()
    }
}

enum Request<S: GenServer> {
    Call(S::Call, ReplyTo<S::Reply>),
    Cast(S::Cast),
    Info(S::Info),
    Stop(ExitReason),
}

/// Message type of a gen-server actor. Built only by [`GenServerRef`].
pub struct ServerMsg<S: GenServer>(Request<S>);

/// The server's view of itself while a callback runs.
pub struct ServerContext<'a, S: GenServer> {
    actor: &'a mut Context<ServerMsg<S>>,
    call_timeout: Duration,
    stop: Option<ExitReason>,
    timeout: Option<Duration>,
}

impl<S: GenServer> ServerContext<'_, S> {
    /// The underlying actor context, for links, watches and state.
    pub fn actor(&self) -> &Context<ServerMsg<S>> {
        self.actor
    }

    /// Mutable access to the underlying actor context.
    pub fn actor_mut(&mut self) -> &mut Context<ServerMsg<S>> {
        self.actor
    }

    /// This server's id.
    pub fn id(&self) -> ActorId {
        self.actor.id()
    }

    /// The system the server runs in.
    pub fn system(&self) -> &ActorSystem {
        self.actor.system()
    }

    /// Handle to this server.
    pub fn myself(&self) -> GenServerRef<S> {
        GenServerRef {
            actor: self.actor.myself().clone(),
            call_timeout: self.call_timeout,
        }
    }

    /// Terminate with `reason` once the current callback returns.
    pub fn stop(&mut self, reason: ExitReason) {
        self.stop = Some(reason);
    }

    /// Run `handle_timeout` whenever the mailbox stays idle for `timeout`;
    /// `None` waits indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// The current idle timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Handle to a running gen-server.
pub struct GenServerRef<S: GenServer> {
    actor: ActorRef<ServerMsg<S>>,
    call_timeout: Duration,
}

impl<S: GenServer> GenServerRef<S> {
    /// The server's id.
    pub fn id(&self) -> ActorId {
        self.actor.id()
    }

    /// The underlying actor handle.
    pub fn actor(&self) -> &ActorRef<ServerMsg<S>> {
        &self.actor
    }

    /// Erase the message type.
    pub fn into_any(self) -> AnyActorRef {
        self.actor.into_any()
    }

    /// Call with the system's default call timeout.
    pub fn call(&self, request: S::Call) -> Result<S::Reply, CallError> {
        self.call_timeout(request, self.call_timeout)
    }

    /// Call and wait at most `timeout` for the reply.
    pub fn call_timeout(&self, request: S::Call, timeout: Duration) -> Result<S::Reply, CallError> {
        let (tx, rx) = bounded(1);
        let reply = ReplyTo::new(tx);
        let request_id = reply.request_id();
        self.actor
            .send_sync(ServerMsg(Request::Call(request, reply)))
            .map_err(|_| CallError::ServerDown)?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                debug!("Call {} to {} timed out after {:?}", request_id, self.actor, timeout);
                Err(CallError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                if self.actor.mailbox().is_closed() {
                    Err(CallError::ServerDown)
                } else {
                    Err(CallError::Failed(Arc::new(ActorError::failed(format!(
                        "request {} dropped without a reply",
                        request_id
                    )))))
                }
            }
        }
    }

    /// Send an asynchronous request.
    pub fn cast(&self, message: S::Cast) -> Result<(), MailboxError> {
        self.actor.send(ServerMsg(Request::Cast(message)))
    }

    /// Send an out-of-band message, handled by `handle_info`.
    pub fn info(&self, message: S::Info) -> Result<(), MailboxError> {
        self.actor.send(ServerMsg(Request::Info(message)))
    }

    /// Stop the server after the messages already queued.
    pub fn shutdown(&self) -> Result<(), MailboxError> {
        self.actor.send(ServerMsg(Request::Stop(ExitReason::Shutdown)))
    }

    /// Kill the server at once; `terminate` still runs.
    pub fn kill(&self) {
        self.actor.kill();
    }

    /// Whether the server is running.
    pub fn is_alive(&self) -> bool {
        self.actor.is_alive()
    }

    /// Wait up to `timeout` for the server to terminate.
    pub fn join(&self, timeout: Duration) -> Option<ExitReason> {
        self.actor.join(timeout)
    }
}

impl<S: GenServer> Clone for GenServerRef<S> {
    fn clone(&self) -> Self {
        Self {
            actor: self.actor.clone(),
            call_timeout: self.call_timeout,
        }
    }
}

impl<S: GenServer> fmt::Debug for GenServerRef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenServerRef")
            .field("actor", &self.actor)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// Start `server` as an unlinked, anonymous actor.
pub fn start<S: GenServer>(system: &ActorSystem, server: S) -> Result<GenServerRef<S>, ActorError> {
    start_with(system, server, SpawnOptions::new())
}

/// Start `server` with `options` and wait for `init` to finish.
///
/// A failed `init` is returned here; the server then exits without being
/// linked to `options`' link target.
pub fn start_with<S: GenServer>(
    system: &ActorSystem,
    server: S,
    options: SpawnOptions,
) -> Result<GenServerRef<S>, ActorError> {
    let call_timeout = system.config().call_timeout;
    let parent = options.linked_to();
    let (ack_tx, ack_rx) = bounded(1);

    let actor = system.spawn_with(options, move |ctx: &mut Context<ServerMsg<S>>| {
        run_server(ctx, server, parent, call_timeout, ack_tx)
    })?;

    match ack_rx.recv() {
        Ok(Ok(())) => Ok(GenServerRef {
            actor,
            call_timeout,
        }),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(ActorError::SpawnFailed(format!(
            "server {} exited before finishing init",
            actor
        ))),
    }
}

pub(crate) fn guarded<T>(f: impl FnOnce() -> Result<T, ActorError>) -> Result<T, ActorError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(ActorError::Panicked(panic_message(payload.as_ref()))))
}

/// Turn a requested stop reason back into the entry function's result.
fn stop_result(id: ActorId, reason: ExitReason) -> Result<(), ActorError> {
    match reason {
        ExitReason::Normal => Ok(()),
        ExitReason::Error(err) => Err((*err).clone()),
        other => Err(ActorError::Exit(Exit::link(id, other))),
    }
}

fn run_server<S: GenServer>(
    ctx: &mut Context<ServerMsg<S>>,
    mut server: S,
    parent: Option<ActorId>,
    call_timeout: Duration,
    ack: Sender<Result<(), ActorError>>,
) -> Result<(), ActorError> {
    let id = ctx.id();
    let mut sctx = ServerContext {
        actor: ctx,
        call_timeout,
        stop: None,
        timeout: None,
    };

    if let Err(err) = guarded(|| server.init(&mut sctx)) {
        debug!("Server {} init failed: {}", id, err);
        if let Some(parent) = parent {
            sctx.actor.unlink(parent);
        }
        let _ = ack.send(Err(err.clone()));
        return Err(err);
    }
    let _ = ack.send(Ok(()));

    let result = serve(&mut server, &mut sctx, parent);

    let reason = match &result {
        Ok(()) => ExitReason::Normal,
        Err(err) => ExitReason::from(err.clone()),
    };
    if panic::catch_unwind(AssertUnwindSafe(|| server.terminate(&reason))).is_err() {
        error!("Server {} panicked in terminate", id);
    }
    result
}

fn serve<S: GenServer>(
    server: &mut S,
    sctx: &mut ServerContext<'_, S>,
    parent: Option<ActorId>,
) -> Result<(), ActorError> {
    loop {
        if let Some(reason) = sctx.stop.take() {
            return stop_result(sctx.id(), reason);
        }

        let next = match sctx.timeout {
            Some(timeout) => sctx.actor.recv_timeout(timeout)?,
            None => Some(sctx.actor.recv()?),
        };

        match next {
            None => guarded(|| server.handle_timeout(sctx))?,
            Some(Signal::Message(ServerMsg(request))) => match request {
                Request::Call(call, reply) => {
                    let kept = reply.clone();
                    if let Err(err) = guarded(|| server.handle_call(call, reply, sctx)) {
                        kept.reply_error(err.clone());
                        return Err(err);
                    }
                }
                Request::Cast(message) => guarded(|| server.handle_cast(message, sctx))?,
                Request::Info(message) => {
                    guarded(|| server.handle_info(Info::Message(message), sctx))?
                }
                Request::Stop(reason) => sctx.stop(reason),
            },
            Some(Signal::Exit(exit)) => {
                if !exit.is_watch() && Some(exit.from) == parent {
                    debug!("Server {} stopping on exit from its parent", sctx.id());
                    return Err(ActorError::Exit(exit));
                }
                guarded(|| server.handle_info(Info::Exit(exit), sctx))?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_to_answers_once() {
        let (tx, rx) = bounded(1);
        let reply: ReplyTo<u32> = ReplyTo::new(tx);
        let copy = reply.clone();

        assert!(!reply.is_replied());
        assert!(reply.reply(1));
        assert!(!copy.reply(2));
        assert!(!copy.reply_error(ActorError::failed("late")));
        assert!(copy.is_replied());
        assert_eq!(rx.recv().ok().and_then(|r| r.ok()), Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reply_to_caller_gone() {
        let (tx, rx) = bounded::<Result<u32, CallError>>(1);
        drop(rx);
        let reply = ReplyTo::new(tx);
        assert!(!reply.reply(5));
        assert!(reply.is_replied());
    }

    #[test]
    fn test_stop_result() {
        let id = ActorId::new();
        assert!(stop_result(id, ExitReason::Normal).is_ok());
        let shutdown = stop_result(id, ExitReason::Shutdown).unwrap_err();
        assert!(matches!(ExitReason::from(shutdown), ExitReason::Shutdown));
        let failed = stop_result(id, ExitReason::error(ActorError::failed("x"))).unwrap_err();
        assert!(matches!(failed, ActorError::Failed(ref m) if m == "x"));
    }
}
