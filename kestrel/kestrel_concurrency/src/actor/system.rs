//! Actor system: spawning, lifecycle and the shared link graph and registry.
//!
//! Every actor runs its entry function on a dedicated OS thread. When the
//! function returns, fails or panics the system closes the mailbox, removes
//! any registered name, notifies linked and watching actors and finally
//! publishes the outcome to anyone joining the actor.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kestrel_core::{ActorError, ActorId, ExitReason, MailboxConfig, RegistryError, WatchToken};
use log::{debug, info, warn};

use super::actor_ref::{ActorCell, ActorRef, AnyActorRef};
use super::context::{set_current_actor, Context};
use super::link::LinkGraph;
use super::mailbox::Mailbox;
use super::registry::Registry;

/// Configuration for the actor system
#[derive(Debug, Clone)]
pub struct ActorSystemConfig {
    /// Mailbox settings for actors spawned without explicit ones
    pub default_mailbox: MailboxConfig,

    /// Stack size for actor threads; platform default when `None`
    pub stack_size: Option<usize>,

    /// Name prefix for actor threads
    pub thread_name_prefix: String,

    /// Default timeout for gen-server calls
    pub call_timeout: Duration,
}

impl Default for ActorSystemConfig {
    fn default() -> Self {
        Self {
            default_mailbox: MailboxConfig::default(),
            stack_size: None,
            thread_name_prefix: "kestrel-actor".to_string(),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Options for spawning one actor.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    name: Option<String>,
    mailbox: Option<MailboxConfig>,
    trap_exits: bool,
    stack_size: Option<usize>,
    link_to: Option<ActorId>,
}

impl SpawnOptions {
    /// Default options: anonymous, system mailbox defaults, not trapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the actor under `name` for its lifetime.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Use `mailbox` instead of the system default.
    pub fn mailbox(mut self, mailbox: MailboxConfig) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    /// Start with exit trapping already enabled.
    pub fn trap_exits(mut self, trap: bool) -> Self {
        self.trap_exits = trap;
        self
    }

    /// Stack size for the actor's thread.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Link the new actor to `parent` before it runs.
    pub fn link_to(mut self, parent: ActorId) -> Self {
        self.link_to = Some(parent);
        self
    }

    /// The name the actor will be registered under.
    pub fn registered_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The actor the new actor will be linked to.
    pub fn linked_to(&self) -> Option<ActorId> {
        self.link_to
    }
}

struct SystemInner {
    config: ActorSystemConfig,
    graph: LinkGraph,
    registry: Registry,
}

/// Handle to the actor system. Cheap to clone.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// Create a new actor system with default configuration
    pub fn new() -> Self {
        Self::with_config(ActorSystemConfig::default())
    }

    /// Create a new actor system with the specified configuration
    pub fn with_config(config: ActorSystemConfig) -> Self {
        info!(
            "Creating actor system (mailbox capacity: {:?}, overflow: {:?})",
            config.default_mailbox.capacity, config.default_mailbox.overflow
        );
        Self {
            inner: Arc::new(SystemInner {
                config,
                graph: LinkGraph::new(),
                registry: Registry::new(),
            }),
        }
    }

    /// The system configuration.
    pub fn config(&self) -> &ActorSystemConfig {
        &self.inner.config
    }

    /// Spawn an anonymous actor with default options.
    pub fn spawn<M, F>(&self, entry: F) -> Result<ActorRef<M>, ActorError>
    where
        M: Send + 'static,
        F: FnOnce(&mut Context<M>) -> Result<(), ActorError> + Send + 'static,
    {
        self.spawn_with(SpawnOptions::default(), entry)
    }

    /// Spawn an actor running `entry` on its own thread.
    ///
    /// Name registration and the initial link are in place before `entry`
    /// starts, so a failing child cannot slip past its parent.
    pub fn spawn_with<M, F>(&self, options: SpawnOptions, entry: F) -> Result<ActorRef<M>, ActorError>
    where
        M: Send + 'static,
        F: FnOnce(&mut Context<M>) -> Result<(), ActorError> + Send + 'static,
    {
        let id = ActorId::new();
        let mailbox_config = options.mailbox.unwrap_or(self.inner.config.default_mailbox);
        let mailbox = Arc::new(Mailbox::new(id, mailbox_config));
        mailbox.set_trap_exits(options.trap_exits);

        let cell = Arc::new(ActorCell::new(id, options.name.clone(), mailbox.clone()));
        let actor = ActorRef::from_parts(Arc::clone(&cell), Arc::clone(&mailbox));

        if let Some(name) = &options.name {
            self.inner.registry.register(name, actor.clone().into_any())?;
        }
        if let Err(err) = self.inner.graph.register(Arc::clone(&cell), options.link_to) {
            if let Some(name) = &options.name {
                self.inner.registry.unregister_actor(name, id);
            }
            return Err(err);
        }

        let thread_name = match &options.name {
            Some(name) => format!("{}-{}", self.inner.config.thread_name_prefix, name),
            None => format!("{}-{}", self.inner.config.thread_name_prefix, id.short()),
        };
        let mut builder = thread::Builder::new().name(thread_name);
        if let Some(bytes) = options.stack_size.or(self.inner.config.stack_size) {
            builder = builder.stack_size(bytes);
        }

        let system = self.clone();
        let myself = actor.clone();
        let spawned = builder.spawn(move || run_actor(system, myself, entry));

        if let Err(err) = spawned {
            let cause = ActorError::SpawnFailed(err.to_string());
            warn!("Failed to start thread for actor {}: {}", id, err);
            if let Some(parent) = options.link_to {
                self.inner.graph.unlink(id, parent);
            }
            mailbox.close();
            if let Some(name) = &options.name {
                self.inner.registry.unregister_actor(name, id);
            }
            self.inner.graph.terminate(id, &ExitReason::NoProc);
            cell.finish(ExitReason::error(ActorError::SpawnFailed(err.to_string())));
            return Err(cause);
        }

        debug!("Spawned actor {}", actor);
        Ok(actor)
    }

    /// Link two actors. Linking to a dead actor delivers `noproc` at once.
    pub fn link(&self, a: ActorId, b: ActorId) {
        self.inner.graph.link(a, b);
    }

    /// Remove the link between two actors, if any.
    pub fn unlink(&self, a: ActorId, b: ActorId) {
        self.inner.graph.unlink(a, b);
    }

    /// Unlink `peer` from `owner`; false if `peer` is already terminating.
    pub(crate) fn detach(&self, owner: ActorId, peer: ActorId) -> bool {
        self.inner.graph.detach(owner, peer)
    }

    /// Let `watcher` observe the termination of `watched`.
    pub fn watch(&self, watcher: ActorId, watched: ActorId) -> WatchToken {
        self.inner.graph.watch(watcher, watched)
    }

    /// Remove one watch edge. Returns whether it existed.
    pub fn unwatch(&self, watcher: ActorId, watched: ActorId, token: WatchToken) -> bool {
        self.inner.graph.unwatch(watcher, watched, token)
    }

    /// Send an exit signal to a live actor. Returns false if it is gone.
    pub fn exit(&self, id: ActorId, reason: ExitReason) -> bool {
        match self.inner.graph.lookup(id) {
            Some(cell) => {
                cell.signal_exit(reason);
                true
            }
            None => false,
        }
    }

    /// Kill a live actor. Returns false if it is gone.
    pub fn kill(&self, id: ActorId) -> bool {
        self.exit(id, ExitReason::Killed)
    }

    /// Register a running actor under `name`.
    pub fn register(&self, name: &str, actor: impl Into<AnyActorRef>) -> Result<(), RegistryError> {
        self.inner.registry.register(name, actor.into())
    }

    /// Remove a name registration.
    pub fn unregister(&self, name: &str) -> Option<AnyActorRef> {
        self.inner.registry.unregister(name)
    }

    /// Look up a live actor by name with the expected message type.
    pub fn whereis<M: Send + 'static>(&self, name: &str) -> Option<ActorRef<M>> {
        self.inner.registry.whereis(name)?.downcast::<M>()
    }

    /// Look up a live actor by name regardless of its message type.
    pub fn whereis_any(&self, name: &str) -> Option<AnyActorRef> {
        self.inner.registry.whereis(name)
    }

    /// Names currently held by live actors, sorted.
    pub fn registered(&self) -> Vec<String> {
        self.inner.registry.registered()
    }

    /// Whether `id` names a live actor.
    pub fn is_alive(&self, id: ActorId) -> bool {
        self.inner.graph.is_alive(id)
    }

    /// Number of live actors.
    pub fn actor_count(&self) -> usize {
        self.inner.graph.live_count()
    }

    /// Actors currently linked to `id`.
    pub fn links_of(&self, id: ActorId) -> Vec<ActorId> {
        self.inner.graph.links_of(id)
    }

    fn terminate(&self, cell: &ActorCell, reason: ExitReason) {
        let id = cell.id();
        if let Some(name) = cell.name() {
            self.inner.registry.unregister_actor(name, id);
        }
        self.inner.graph.terminate(id, &reason);

        if reason.is_normal() {
            debug!("Actor {} exited: {}", id, reason);
        } else {
            warn!("Actor {} terminated: {}", id, reason);
        }
        cell.finish(reason);
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("config", &self.inner.config)
            .field("actors", &self.actor_count())
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn run_actor<M, F>(system: ActorSystem, myself: ActorRef<M>, entry: F)
where
    M: Send + 'static,
    F: FnOnce(&mut Context<M>) -> Result<(), ActorError>,
{
    set_current_actor(Some(myself.id()));

    let mut ctx = Context::new(system.clone(), myself.clone());
    let result = panic::catch_unwind(AssertUnwindSafe(move || {
        let result = entry(&mut ctx);
        drop(ctx);
        result
    }));

    let reason = match result {
        Ok(Ok(())) => ExitReason::Normal,
        Ok(Err(err)) => ExitReason::from(err),
        Err(payload) => ExitReason::error(ActorError::Panicked(panic_message(payload.as_ref()))),
    };

    myself.mailbox().close();
    system.terminate(myself.cell(), reason);
    set_current_actor(None);
}
