//! Kestrel Runtime - supervised actor runtime
//!
//! This crate ties the Kestrel crates together: it loads configuration,
//! installs logging, starts an [`ActorSystem`] with a root supervisor and
//! shuts the whole tree down in order.

pub mod system;

use std::path::Path;

use anyhow::{Context, Result};
use kestrel_concurrency::{
    ActorSystem, AnyActorRef, ChildSpec, Supervisor, SupervisorRef, SupervisorSpec,
};
use kestrel_core::{ActorError, ExitReason, SupervisionError};
use tracing::{error, info, warn};

use system::{RuntimeConfig, ShutdownError};

/// Runtime facade owning an actor system and its root supervisor.
pub struct Runtime {
    config: RuntimeConfig,
    system: ActorSystem,
    root: SupervisorRef,
}

impl Runtime {
    /// Start a runtime from `config`.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        info!("Initializing Kestrel Runtime");
        config.validate()?;

        let system = ActorSystem::with_config(config.actor_system_config());
        let root = Supervisor::start(
            &system,
            SupervisorSpec::new(config.supervisor.strategy).name(config.supervisor.name.as_str()),
        )
        .context("Failed to start root supervisor")?;

        info!("Kestrel Runtime started, root supervisor {}", root.id());
        Ok(Self {
            config,
            system,
            root,
        })
    }

    /// Load configuration from `config_path`, install logging and start.
    pub fn from_path(config_path: Option<&Path>) -> Result<Self> {
        let config = RuntimeConfig::load(config_path)?;
        system::init_logging(config.log_level)?;
        Self::new(config)
    }

    /// The configuration the runtime was started with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The actor system.
    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// The root supervisor.
    pub fn root(&self) -> &SupervisorRef {
        &self.root
    }

    /// Add `spec` under the root supervisor as is.
    pub fn start_child(&self, spec: ChildSpec) -> Result<AnyActorRef, SupervisionError> {
        self.root.add_child(spec)
    }

    /// Add a plain actor under the root supervisor, with the configured
    /// restart limit and shutdown deadline.
    pub fn start_actor<M, F>(&self, id: &str, entry: F) -> Result<AnyActorRef, SupervisionError>
    where
        M: Send + 'static,
        F: Fn(&mut kestrel_concurrency::Context<M>) -> Result<(), ActorError>
            + Send
            + Sync
            + 'static,
    {
        self.start_child(self.config.supervisor.apply(ChildSpec::actor(id, entry)))
    }

    /// Stop the root supervisor and wait for it.
    ///
    /// The root is killed if it does not stop within the configured shutdown
    /// timeout, and given the same timeout again to terminate. Calling this
    /// again after a clean shutdown succeeds.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        info!("Shutting down Kestrel Runtime");
        let timeout = self.config.shutdown_timeout();

        self.root.shutdown();
        match self.root.join(timeout) {
            Some(reason) if reason.is_normal() => {
                info!("Kestrel Runtime shut down successfully");
                Ok(())
            }
            Some(reason) => {
                warn!("Root supervisor terminated abnormally: {}", reason);
                Err(ShutdownError::RootFailed(reason))
            }
            None => {
                warn!("Root supervisor did not stop within {:?}, killing it", timeout);
                self.root.actor().kill();
                match self.root.join(timeout) {
                    Some(_) => Err(ShutdownError::Timeout(timeout)),
                    None => {
                        error!("Root supervisor survived a kill");
                        Err(ShutdownError::Unresponsive(timeout))
                    }
                }
            }
        }
    }

    /// Whether the root supervisor is running.
    pub fn is_running(&self) -> bool {
        self.root.is_alive()
    }

    /// Block until the root supervisor terminates.
    pub fn wait(&self) -> ExitReason {
        loop {
            if let Some(reason) = self.root.join(self.config.shutdown_timeout()) {
                return reason;
            }
        }
    }
}
