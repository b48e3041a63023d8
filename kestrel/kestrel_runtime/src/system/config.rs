//! Configuration for the Kestrel runtime
//!
//! Handles loading, validating and converting runtime configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use kestrel_concurrency::{ActorSystemConfig, ChildSpec};
use kestrel_core::{LogLevel, MailboxConfig, RestartStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur in configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Actor thread settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Stack size of actor threads in bytes; platform default when absent
    #[serde(default)]
    pub stack_size: Option<usize>,

    /// Name prefix of actor threads
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_thread_name_prefix() -> String {
    "kestrel-actor".to_string()
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            stack_size: None,
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

/// Root supervisor settings and child defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Registered name of the root supervisor
    #[serde(default = "default_root_name")]
    pub name: String,

    /// Restart strategy of the root supervisor
    #[serde(default)]
    pub strategy: RestartStrategy,

    /// Default restart budget of a child
    #[serde(default = "default_max_restarts")]
    pub max_restarts: usize,

    /// Default window (milliseconds) the restart budget applies to
    #[serde(default = "default_restart_window_ms")]
    pub restart_window_ms: u64,

    /// Default time (milliseconds) a child gets to stop before it is killed
    #[serde(default = "default_shutdown_deadline_ms")]
    pub shutdown_deadline_ms: u64,
}

fn default_root_name() -> String {
    "kestrel.root".to_string()
}

fn default_max_restarts() -> usize {
    ChildSpec::DEFAULT_MAX_RESTARTS
}

fn default_restart_window_ms() -> u64 {
    ChildSpec::DEFAULT_RESTART_WINDOW.as_millis() as u64
}

fn default_shutdown_deadline_ms() -> u64 {
    ChildSpec::DEFAULT_SHUTDOWN_DEADLINE.as_millis() as u64
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            name: default_root_name(),
            strategy: RestartStrategy::default(),
            max_restarts: default_max_restarts(),
            restart_window_ms: default_restart_window_ms(),
            shutdown_deadline_ms: default_shutdown_deadline_ms(),
        }
    }
}

impl SupervisorConfig {
    /// The restart window as a duration.
    pub fn restart_window(&self) -> Duration {
        Duration::from_millis(self.restart_window_ms)
    }

    /// The shutdown deadline as a duration.
    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.shutdown_deadline_ms)
    }

    /// Apply these defaults to `spec`, overriding its restart limit and
    /// shutdown deadline.
    pub fn apply(&self, spec: ChildSpec) -> ChildSpec {
        spec.restart_limit(self.max_restarts, self.restart_window())
            .shutdown_deadline(self.shutdown_deadline())
    }
}

/// Gen-server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenServerConfig {
    /// Default call timeout in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

impl Default for GenServerConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Log level used when `RUST_LOG` is not set
    #[serde(default)]
    pub log_level: LogLevel,

    /// Default mailbox of spawned actors
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// Actor thread settings
    #[serde(default)]
    pub actor: ActorConfig,

    /// Root supervisor settings
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Gen-server settings
    #[serde(default)]
    pub gen_server: GenServerConfig,

    /// How long (milliseconds) shutdown waits for the root supervisor
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            mailbox: MailboxConfig::default(),
            actor: ActorConfig::default(),
            supervisor: SupervisorConfig::default(),
            gen_server: GenServerConfig::default(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file, or defaults when `path` is
    /// `None` or does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if !path.exists() => {
                warn!("Configuration file not found: {}", path.display());
                RuntimeConfig::default()
            }
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let content = fs::read_to_string(path)
                    .map_err(|e| ConfigError::LoadFailed(e.to_string()))
                    .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
                Self::parse(&content)
                    .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?
            }
            None => {
                info!("No configuration file specified, using defaults");
                RuntimeConfig::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()).into())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mailbox.capacity == Some(0) {
            return Err(ConfigError::Invalid("Mailbox capacity cannot be zero".to_string()).into());
        }

        if self.actor.thread_name_prefix.is_empty() {
            return Err(
                ConfigError::Invalid("Thread name prefix cannot be empty".to_string()).into(),
            );
        }

        if self.supervisor.name.is_empty() {
            return Err(
                ConfigError::Invalid("Root supervisor name cannot be empty".to_string()).into(),
            );
        }

        if self.supervisor.restart_window_ms == 0 {
            return Err(ConfigError::Invalid("Restart window cannot be zero".to_string()).into());
        }

        if self.gen_server.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("Call timeout cannot be zero".to_string()).into());
        }

        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::Invalid("Shutdown timeout cannot be zero".to_string()).into());
        }

        if self.supervisor.max_restarts == 0 {
            warn!("max_restarts is zero: the first child failure escalates");
        }

        Ok(())
    }

    /// How long shutdown waits for the root supervisor.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Settings for the actor system.
    pub fn actor_system_config(&self) -> ActorSystemConfig {
        ActorSystemConfig {
            default_mailbox: self.mailbox,
            stack_size: self.actor.stack_size,
            thread_name_prefix: self.actor.thread_name_prefix.clone(),
            call_timeout: Duration::from_millis(self.gen_server.call_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::OverflowPolicy;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            log_level = "debug"
            shutdown_timeout_ms = 2000

            [mailbox]
            capacity = 64
            overflow = "block"

            [supervisor]
            strategy = "rest-for-one"
            max_restarts = 10

            [gen_server]
            call_timeout_ms = 250
        "#;
        fs::write(file.path(), config_toml).unwrap();

        let config = RuntimeConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(2));
        assert_eq!(config.mailbox, MailboxConfig::bounded(64, OverflowPolicy::Block));
        assert_eq!(config.supervisor.strategy, RestartStrategy::RestForOne);
        assert_eq!(config.supervisor.max_restarts, 10);
        // Unset keys keep their defaults.
        assert_eq!(config.supervisor.restart_window_ms, 5_000);
        assert_eq!(config.supervisor.name, "kestrel.root");

        let system = config.actor_system_config();
        assert_eq!(system.call_timeout, Duration::from_millis(250));
        assert_eq!(system.thread_name_prefix, "kestrel-actor");
    }

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::load(None).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.mailbox.is_bounded());
        assert_eq!(config.shutdown_timeout_ms, 30_000);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = RuntimeConfig::load(Some(&path)).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let err = RuntimeConfig::from_toml_str("[mailbox]\ncapacity = 0").unwrap_err();
        assert!(err.to_string().contains("Mailbox capacity"));

        let err = RuntimeConfig::from_toml_str("shutdown_timeout_ms = 0").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Invalid(_))
        ));

        let err = RuntimeConfig::from_toml_str("log_level = 7").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_apply_supervisor_defaults() {
        let defaults = SupervisorConfig {
            max_restarts: 1,
            restart_window_ms: 100,
            shutdown_deadline_ms: 20,
            ..SupervisorConfig::default()
        };
        let spec = defaults.apply(ChildSpec::actor("worker", |ctx: &mut kestrel_concurrency::Context<()>| {
            ctx.recv().map(|_| ())
        }));
        assert_eq!(spec.id, "worker");
        assert_eq!(spec.max_restarts, 1);
        assert_eq!(spec.restart_window, Duration::from_millis(100));
        assert_eq!(spec.shutdown_deadline, Duration::from_millis(20));
    }
}
