//! VM run state as reported by the management API

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// VM run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    /// Powered off
    Stopped,
    /// Booting
    Starting,
    /// Up and running
    Running,
    /// Shutting down
    Stopping,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

impl FromStr for VmState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stopped" | "off" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            other => Err(format!("unknown VM state '{}'", other)),
        }
    }
}

/// Which VM states keep an interactive session alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractivePolicy {
    /// Serial console: the guest must be running
    SerialConsole,
    /// Graphical display: the framebuffer exists while starting, running or stopping
    Display,
}

impl InteractivePolicy {
    /// Whether `state` qualifies as interactive-capable under this policy
    #[must_use]
    pub fn allows(&self, state: VmState) -> bool {
        match self {
            Self::SerialConsole => state == VmState::Running,
            Self::Display => matches!(
                state,
                VmState::Starting | VmState::Running | VmState::Stopping
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_policy_requires_running() {
        let policy = InteractivePolicy::SerialConsole;
        assert!(policy.allows(VmState::Running));
        assert!(!policy.allows(VmState::Starting));
        assert!(!policy.allows(VmState::Stopping));
        assert!(!policy.allows(VmState::Stopped));
    }

    #[test]
    fn test_display_policy() {
        let policy = InteractivePolicy::Display;
        assert!(policy.allows(VmState::Starting));
        assert!(policy.allows(VmState::Running));
        assert!(policy.allows(VmState::Stopping));
        assert!(!policy.allows(VmState::Stopped));
    }

    #[test]
    fn test_state_parse_and_serde() {
        assert_eq!("Running".parse::<VmState>().unwrap(), VmState::Running);
        assert!("paused".parse::<VmState>().is_err());

        let json = serde_json::to_string(&VmState::Stopping).unwrap();
        assert_eq!(json, "\"stopping\"");
        let state: VmState = serde_json::from_str("\"starting\"").unwrap();
        assert_eq!(state, VmState::Starting);
    }
}
