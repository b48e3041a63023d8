//! Supervision settings.

use serde::{Deserialize, Serialize};

use super::exit::ExitReason;

/// When a terminated child is restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// Always restarted
    Permanent,

    /// Restarted only after an abnormal termination
    Transient,

    /// Never restarted
    Temporary,
}

impl RestartMode {
    /// Whether a child in this mode is restarted after terminating with `reason`.
    pub fn should_restart(&self, reason: &ExitReason) -> bool {
        match self {
            Self::Permanent => true,
            Self::Transient => !reason.is_normal(),
            Self::Temporary => false,
        }
    }
}

/// Which children are restarted when one of them terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartStrategy {
    /// Only the terminated child
    OneForOne,

    /// Every child
    OneForAll,

    /// The terminated child and every child declared after it
    RestForOne,
}

impl Default for RestartStrategy {
    fn default() -> Self {
        Self::OneForOne
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActorError;

    #[test]
    fn test_restart_modes() {
        let crash = ExitReason::error(ActorError::failed("crash"));

        assert!(RestartMode::Permanent.should_restart(&ExitReason::Normal));
        assert!(RestartMode::Permanent.should_restart(&crash));

        assert!(!RestartMode::Transient.should_restart(&ExitReason::Normal));
        assert!(!RestartMode::Transient.should_restart(&ExitReason::Shutdown));
        assert!(RestartMode::Transient.should_restart(&crash));
        assert!(RestartMode::Transient.should_restart(&ExitReason::Killed));

        assert!(!RestartMode::Temporary.should_restart(&crash));
    }

    #[test]
    fn test_strategy_serialization() {
        let strategy: RestartStrategy = serde_json::from_str("\"rest-for-one\"").unwrap();
        assert_eq!(strategy, RestartStrategy::RestForOne);
        assert_eq!(RestartStrategy::default(), RestartStrategy::OneForOne);
    }
}
