//! Actor supervision and failure recovery.
//!
//! A supervisor is itself an actor. It traps exits, starts its children
//! linked to itself and reacts to their termination according to its
//! [`RestartStrategy`] and each child's [`RestartMode`]. A child that
//! restarts more than `max_restarts` times within `restart_window` makes the
//! supervisor give up: it stops the remaining children and terminates with
//! [`SupervisionError::RestartLimitExceeded`], which its own supervisor sees
//! as an ordinary child failure.
//!
//! Changes to the child list are commands handled by the supervisor's own
//! receive loop, so they never race with restart handling.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use kestrel_core::{
    ActorError, ActorId, Exit, ExitReason, RestartMode, RestartStrategy, SupervisionError,
    WatchToken,
};
use log::{debug, error, info, warn};

use super::actor_ref::{ActorRef, AnyActorRef};
use super::context::Context;
use super::mailbox::Signal;
use super::system::{ActorSystem, SpawnOptions};

/// Starts one incarnation of a child. Must spawn with the given options,
/// which link the child to its supervisor.
pub type ChildBuilder =
    Arc<dyn Fn(&ActorSystem, SpawnOptions) -> Result<AnyActorRef, ActorError> + Send + Sync>;

/// Description of one supervised child.
#[derive(Clone)]
pub struct ChildSpec {
    /// Unique id within the supervisor
    pub id: String,

    /// When the child is restarted
    pub mode: RestartMode,

    /// Restarts tolerated within `restart_window`
    pub max_restarts: usize,

    /// Sliding window for counting restarts
    pub restart_window: Duration,

    /// How long a child gets to stop before it is killed
    pub shutdown_deadline: Duration,

    builder: ChildBuilder,
}

impl ChildSpec {
    /// Default restart limit
    pub const DEFAULT_MAX_RESTARTS: usize = 3;

    /// Default restart window
    pub const DEFAULT_RESTART_WINDOW: Duration = Duration::from_secs(5);

    /// Default shutdown deadline
    pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

    /// A permanent child started by `builder`.
    pub fn new<F>(id: impl Into<String>, builder: F) -> Self
    where
        F: Fn(&ActorSystem, SpawnOptions) -> Result<AnyActorRef, ActorError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            mode: RestartMode::Permanent,
            max_restarts: Self::DEFAULT_MAX_RESTARTS,
            restart_window: Self::DEFAULT_RESTART_WINDOW,
            shutdown_deadline: Self::DEFAULT_SHUTDOWN_DEADLINE,
            builder: Arc::new(builder),
        }
    }

    /// A permanent child running `entry` as a plain actor.
    pub fn actor<M, F>(id: impl Into<String>, entry: F) -> Self
    where
        M: Send + 'static,
        F: Fn(&mut Context<M>) -> Result<(), ActorError> + Send + Sync + 'static,
    {
        let entry = Arc::new(entry);
        Self::new(id, move |system, options| {
            let entry = Arc::clone(&entry);
            system
                .spawn_with(options, move |ctx: &mut Context<M>| (*entry)(ctx))
                .map(AnyActorRef::from)
        })
    }

    /// A nested supervisor.
    pub fn supervisor(id: impl Into<String>, spec: SupervisorSpec) -> Self {
        Self::new(id, move |system, options| {
            spec.clone()
                .spawn_with(system, options)
                .map(SupervisorRef::into_any)
                .map_err(ActorError::from)
        })
    }

    /// Set the restart mode.
    pub fn mode(mut self, mode: RestartMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the restart limit.
    pub fn restart_limit(mut self, max_restarts: usize, window: Duration) -> Self {
        self.max_restarts = max_restarts;
        self.restart_window = window;
        self
    }

    /// Set the shutdown deadline.
    pub fn shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = deadline;
        self
    }

    fn start(&self, system: &ActorSystem, supervisor: ActorId) -> Result<AnyActorRef, ActorError> {
        (self.builder)(system, SpawnOptions::new().link_to(supervisor))
    }
}

impl fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildSpec")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("max_restarts", &self.max_restarts)
            .field("restart_window", &self.restart_window)
            .field("shutdown_deadline", &self.shutdown_deadline)
            .finish_non_exhaustive()
    }
}

/// Snapshot of one child, as reported by [`SupervisorRef::which_children`].
#[derive(Debug, Clone)]
pub struct ChildInfo {
    /// Child id
    pub id: String,
    /// Running incarnation, if any
    pub actor: Option<AnyActorRef>,
    /// Restarts so far
    pub restarts: usize,
    /// Restart mode
    pub mode: RestartMode,
}

/// Fixed-size ring of the most recent restart times.
#[derive(Debug)]
struct RestartWindow {
    slots: Vec<Option<Instant>>,
    next: usize,
    window: Duration,
}

impl RestartWindow {
    fn new(max_restarts: usize, window: Duration) -> Self {
        Self {
            slots: vec![None; max_restarts + 1],
            next: 0,
            window,
        }
    }

    /// Record a restart at `now`. Returns true when it is one too many.
    fn record(&mut self, now: Instant) -> bool {
        self.slots[self.next] = Some(now);
        self.next = (self.next + 1) % self.slots.len();
        match self.slots[self.next] {
            Some(oldest) => now.saturating_duration_since(oldest) <= self.window,
            None => false,
        }
    }
}

/// Supervisor configuration: strategy and initial children.
#[derive(Debug, Clone)]
pub struct SupervisorSpec {
    /// Registered name of the supervisor, if any
    pub name: Option<String>,

    /// Which children are restarted together
    pub strategy: RestartStrategy,

    /// Children, started in order and stopped in reverse
    pub children: Vec<ChildSpec>,
}

impl SupervisorSpec {
    /// An unnamed supervisor with no children.
    pub fn new(strategy: RestartStrategy) -> Self {
        Self {
            name: None,
            strategy,
            children: Vec::new(),
        }
    }

    /// Register the supervisor under `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a child.
    pub fn child(mut self, child: ChildSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Spawn the supervisor with `options` and wait until all initial
    /// children are running.
    pub fn spawn_with(
        self,
        system: &ActorSystem,
        mut options: SpawnOptions,
    ) -> Result<SupervisorRef, SupervisionError> {
        if let Some(name) = &self.name {
            if options.registered_name().is_none() {
                options = options.name(name.clone());
            }
        }
        let label = options
            .registered_name()
            .unwrap_or("supervisor")
            .to_string();
        let parent = options.linked_to();
        let (ack_tx, ack_rx) = bounded(1);

        let actor = system
            .spawn_with(options.trap_exits(true), move |ctx: &mut Context<SupervisorMsg>| {
                run_supervisor(ctx, self, parent, ack_tx)
            })
            .map_err(|err| SupervisionError::StartFailed {
                child: label.clone(),
                reason: err.to_string(),
            })?;

        match ack_rx.recv() {
            Ok(Ok(())) => {
                info!("Supervisor {} started", actor);
                Ok(SupervisorRef { actor })
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(SupervisionError::Unavailable),
        }
    }
}

/// Entry points for starting supervisors.
pub struct Supervisor;

impl Supervisor {
    /// Start a top-level supervisor.
    pub fn start(system: &ActorSystem, spec: SupervisorSpec) -> Result<SupervisorRef, SupervisionError> {
        spec.spawn_with(system, SpawnOptions::new())
    }
}

enum Command {
    AddChild(ChildSpec, Sender<Result<AnyActorRef, SupervisionError>>),
    RemoveChild(String, Sender<Result<(), SupervisionError>>),
    RemoveAndTerminateChild(String, Sender<Result<(), SupervisionError>>),
    WhichChildren(Sender<Vec<ChildInfo>>),
}

/// Message type of supervisor actors. Built only by [`SupervisorRef`].
pub struct SupervisorMsg(Command);

/// Handle to a running supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorRef {
    actor: ActorRef<SupervisorMsg>,
}

impl SupervisorRef {
    /// The supervisor actor's id.
    pub fn id(&self) -> ActorId {
        self.actor.id()
    }

    /// The underlying actor handle.
    pub fn actor(&self) -> &ActorRef<SupervisorMsg> {
        &self.actor
    }

    /// Erase the message type.
    pub fn into_any(self) -> AnyActorRef {
        self.actor.into_any()
    }

    fn request<T>(
        &self,
        command: impl FnOnce(Sender<T>) -> Command,
    ) -> Result<T, SupervisionError> {
        let (tx, rx) = bounded(1);
        self.actor
            .send(SupervisorMsg(command(tx)))
            .map_err(|_| SupervisionError::Unavailable)?;
        rx.recv().map_err(|_| SupervisionError::Unavailable)
    }

    /// Start and supervise a new child.
    pub fn add_child(&self, spec: ChildSpec) -> Result<AnyActorRef, SupervisionError> {
        self.request(|tx| Command::AddChild(spec, tx))?
    }

    /// Stop supervising `id`. A running child is unlinked and left running.
    pub fn remove_child(&self, id: &str) -> Result<(), SupervisionError> {
        self.request(|tx| Command::RemoveChild(id.to_string(), tx))?
    }

    /// Stop the child `id` and forget it.
    pub fn remove_and_terminate_child(&self, id: &str) -> Result<(), SupervisionError> {
        self.request(|tx| Command::RemoveAndTerminateChild(id.to_string(), tx))?
    }

    /// Current children in start order.
    pub fn which_children(&self) -> Result<Vec<ChildInfo>, SupervisionError> {
        self.request(Command::WhichChildren)
    }

    /// Running incarnation of child `id`.
    pub fn child(&self, id: &str) -> Option<AnyActorRef> {
        self.which_children()
            .ok()?
            .into_iter()
            .find(|child| child.id == id)
            .and_then(|child| child.actor)
    }

    /// Ask the supervisor to stop its children and terminate.
    pub fn shutdown(&self) {
        self.actor.exit(ExitReason::Shutdown);
    }

    /// Wait up to `timeout` for the supervisor to terminate.
    pub fn join(&self, timeout: Duration) -> Option<ExitReason> {
        self.actor.join(timeout)
    }

    /// Whether the supervisor is running.
    pub fn is_alive(&self) -> bool {
        self.actor.is_alive()
    }
}

struct Child {
    spec: ChildSpec,
    actor: Option<AnyActorRef>,
    restarts: usize,
    window: RestartWindow,
}

impl Child {
    fn new(spec: ChildSpec) -> Self {
        let window = RestartWindow::new(spec.max_restarts, spec.restart_window);
        Self {
            spec,
            actor: None,
            restarts: 0,
            window,
        }
    }

    fn info(&self) -> ChildInfo {
        ChildInfo {
            id: self.spec.id.clone(),
            actor: self.actor.clone(),
            restarts: self.restarts,
            mode: self.spec.mode,
        }
    }
}

struct SupervisorState {
    system: ActorSystem,
    myself: ActorId,
    strategy: RestartStrategy,
    children: Vec<Child>,
}

fn run_supervisor(
    ctx: &mut Context<SupervisorMsg>,
    spec: SupervisorSpec,
    parent: Option<ActorId>,
    ack: Sender<Result<(), SupervisionError>>,
) -> Result<(), ActorError> {
    let mut state = SupervisorState {
        system: ctx.system().clone(),
        myself: ctx.id(),
        strategy: spec.strategy,
        children: Vec::with_capacity(spec.children.len()),
    };

    if let Err(err) = state.init(ctx, spec.children) {
        error!("Supervisor {} failed to start: {}", state.myself, err);
        let _ = state.stop_all(ctx);
        // The starter already gets the error through the ack.
        if let Some(parent) = parent {
            ctx.unlink(parent);
        }
        let _ = ack.send(Err(err.clone()));
        return Err(err.into());
    }
    let _ = ack.send(Ok(()));

    let result = state.run(ctx);
    match result {
        Err(err) if is_kill(&err) => {
            state.kill_all();
            Err(err)
        }
        result => match state.stop_all(ctx) {
            Some(interrupted) => Err(interrupted),
            None => result,
        },
    }
}

fn is_kill(err: &ActorError) -> bool {
    err.exit().map(|exit| exit.reason.is_kill()).unwrap_or(false)
}

impl SupervisorState {
    fn init(
        &mut self,
        ctx: &Context<SupervisorMsg>,
        specs: Vec<ChildSpec>,
    ) -> Result<(), SupervisionError> {
        for spec in specs {
            if self.position(&spec.id).is_some() {
                return Err(SupervisionError::DuplicateChild(spec.id));
            }
            let mut child = Child::new(spec);
            child.actor = Some(self.start_once(&child.spec)?);
            self.children.push(child);
        }
        debug!(
            "Supervisor {} started {} children",
            ctx.id(),
            self.children.len()
        );
        Ok(())
    }

    fn run(&mut self, ctx: &Context<SupervisorMsg>) -> Result<(), ActorError> {
        loop {
            match ctx.recv()? {
                Signal::Message(SupervisorMsg(command)) => self.handle_command(ctx, command)?,
                Signal::Exit(exit) if exit.is_watch() => {}
                Signal::Exit(exit) => match self.position_of_actor(exit.from) {
                    Some(index) => self.handle_child_exit(ctx, index, exit.reason)?,
                    None if matches!(exit.reason, ExitReason::Normal) => {
                        debug!("Supervisor {} ignoring normal exit from {}", self.myself, exit.from);
                    }
                    None => {
                        info!(
                            "Supervisor {} terminating on exit signal from {}: {}",
                            self.myself, exit.from, exit.reason
                        );
                        return Err(ActorError::Exit(exit));
                    }
                },
            }
        }
    }

    fn handle_command(
        &mut self,
        ctx: &Context<SupervisorMsg>,
        command: Command,
    ) -> Result<(), ActorError> {
        match command {
            Command::AddChild(spec, reply) => {
                let result = if self.position(&spec.id).is_some() {
                    Err(SupervisionError::DuplicateChild(spec.id))
                } else {
                    let mut child = Child::new(spec);
                    self.start_once(&child.spec).map(|actor| {
                        child.actor = Some(actor.clone());
                        info!("Supervisor {} added child {}", self.myself, child.spec.id);
                        self.children.push(child);
                        actor
                    })
                };
                let _ = reply.send(result);
            }
            Command::RemoveChild(id, reply) => {
                let result = match self.position(&id) {
                    Some(index) => {
                        let child = &mut self.children[index];
                        if let Some(actor) = child.actor.take() {
                            if !self.system.detach(self.myself, actor.id()) {
                                // Already terminating: let its exit land before flushing.
                                actor.join(child.spec.shutdown_deadline);
                            }
                            flush_exit(ctx, actor.id())?;
                        }
                        self.children.remove(index);
                        Ok(())
                    }
                    None => Err(SupervisionError::ChildNotFound(id)),
                };
                let _ = reply.send(result);
            }
            Command::RemoveAndTerminateChild(id, reply) => {
                let result = match self.position(&id) {
                    Some(index) => {
                        self.stop_child(ctx, index)?;
                        self.children.remove(index);
                        Ok(())
                    }
                    None => Err(SupervisionError::ChildNotFound(id)),
                };
                let _ = reply.send(result);
            }
            Command::WhichChildren(reply) => {
                let _ = reply.send(self.children.iter().map(Child::info).collect());
            }
        }
        Ok(())
    }

    fn handle_child_exit(
        &mut self,
        ctx: &Context<SupervisorMsg>,
        index: usize,
        reason: ExitReason,
    ) -> Result<(), ActorError> {
        let child = &mut self.children[index];
        child.actor = None;

        if !child.spec.mode.should_restart(&reason) {
            debug!("Child {} exited ({}), not restarting", child.spec.id, reason);
            if child.spec.mode == RestartMode::Temporary {
                self.children.remove(index);
            }
            return Ok(());
        }
        warn!("Child {} terminated: {}", child.spec.id, reason);

        match self.strategy {
            RestartStrategy::OneForOne => self.restart(index),
            RestartStrategy::OneForAll => self.restart_from(ctx, 0, index),
            RestartStrategy::RestForOne => self.restart_from(ctx, index, index),
        }
    }

    /// Stop every child from `from` on except `failed`, then start them again
    /// in order. Stopped temporary children are dropped.
    fn restart_from(
        &mut self,
        ctx: &Context<SupervisorMsg>,
        from: usize,
        failed: usize,
    ) -> Result<(), ActorError> {
        for index in (from..self.children.len()).rev() {
            if index != failed {
                self.stop_child(ctx, index)?;
            }
        }
        let mut index = from;
        while index < self.children.len() {
            if self.children[index].spec.mode == RestartMode::Temporary {
                self.children.remove(index);
                continue;
            }
            self.restart(index)?;
            index += 1;
        }
        Ok(())
    }

    /// Restart one child, retrying failed starts until the restart limit.
    fn restart(&mut self, index: usize) -> Result<(), ActorError> {
        loop {
            let child = &mut self.children[index];
            if child.window.record(Instant::now()) {
                error!(
                    "Child {} exceeded {} restarts within {:?}, supervisor {} giving up",
                    child.spec.id, child.spec.max_restarts, child.spec.restart_window, self.myself
                );
                return Err(SupervisionError::RestartLimitExceeded {
                    child: child.spec.id.clone(),
                    max_restarts: child.spec.max_restarts,
                    window: child.spec.restart_window,
                }
                .into());
            }
            child.restarts += 1;

            match child.spec.start(&self.system, self.myself) {
                Ok(actor) => {
                    info!("Restarted child {} as {}", child.spec.id, actor.id());
                    child.actor = Some(actor);
                    return Ok(());
                }
                Err(err) => warn!("Restart of child {} failed: {}", child.spec.id, err),
            }
        }
    }

    fn start_once(&self, spec: &ChildSpec) -> Result<AnyActorRef, SupervisionError> {
        spec.start(&self.system, self.myself)
            .map_err(|err| SupervisionError::StartFailed {
                child: spec.id.clone(),
                reason: err.to_string(),
            })
    }

    /// Unlink, ask to shut down, kill after the deadline, and discard an exit
    /// notification that was already queued.
    ///
    /// The wait goes through the mailbox, so a kill aimed at the supervisor
    /// interrupts it; the child is then killed without waiting.
    fn stop_child(&mut self, ctx: &Context<SupervisorMsg>, index: usize) -> Result<(), ActorError> {
        let child = &mut self.children[index];
        let Some(actor) = child.actor.take() else {
            return Ok(());
        };
        let id = actor.id();
        let deadline = child.spec.shutdown_deadline;

        let token = ctx.watch(id);
        self.system.unlink(self.myself, id);
        actor.exit(ExitReason::Shutdown);

        let mut stopped = match await_down(ctx, id, token, deadline) {
            Ok(stopped) => stopped,
            Err(err) => {
                actor.kill();
                return Err(err);
            }
        };
        if !stopped {
            warn!(
                "Child {} did not stop within {:?}, killing it",
                child.spec.id, deadline
            );
            actor.kill();
            stopped = await_down(ctx, id, token, deadline)?;
        }

        if stopped {
            // The watch fires in the same delivery as any pending link signal.
            actor.join(deadline);
            debug!("Stopped child {}", child.spec.id);
        } else {
            error!("Child {} survived a kill", child.spec.id);
            ctx.unwatch(id, token);
        }
        flush_exit(ctx, id)
    }

    /// Stop every child in reverse start order. Returns the error that
    /// interrupted the shutdown, after killing the children left.
    fn stop_all(&mut self, ctx: &Context<SupervisorMsg>) -> Option<ActorError> {
        for index in (0..self.children.len()).rev() {
            if let Err(err) = self.stop_child(ctx, index) {
                debug!("Supervisor {} interrupted while stopping children: {}", self.myself, err);
                self.kill_all();
                return Some(err);
            }
        }
        None
    }

    fn kill_all(&mut self) {
        for child in self.children.iter_mut().rev() {
            if let Some(actor) = child.actor.take() {
                actor.kill();
            }
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.children.iter().position(|child| child.spec.id == id)
    }

    fn position_of_actor(&self, actor: ActorId) -> Option<usize> {
        self.children
            .iter()
            .position(|child| child.actor.as_ref().map(|a| a.id()) == Some(actor))
    }
}

fn await_down(
    ctx: &Context<SupervisorMsg>,
    id: ActorId,
    token: WatchToken,
    deadline: Duration,
) -> Result<bool, ActorError> {
    ctx.receive()
        .on_exit(move |exit: &Exit| exit.from == id && exit.token == Some(token), |_| true)
        .after(deadline, || false)
        .run()
}

fn flush_exit(ctx: &Context<SupervisorMsg>, from: ActorId) -> Result<(), ActorError> {
    ctx.receive()
        .on_exit(move |exit: &Exit| exit.from == from && !exit.is_watch(), |_| ())
        .after(Duration::ZERO, || ())
        .run()
}
