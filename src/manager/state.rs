//! Connection lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the manager's connection currently stands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and no attempt in flight
    #[default]
    Idle,
    /// An attempt is in flight
    Connecting,
    /// The socket is established
    Open,
    /// The socket was open and has closed
    Closed,
    /// The last attempt failed before opening
    Failed,
}

impl ConnectionState {
    /// An attempt is in flight or has succeeded; new attempts are suppressed
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    /// A connection request in this state starts a new attempt
    pub fn accepts_attempt(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn test_attempt_eligibility() {
        assert!(ConnectionState::Idle.accepts_attempt());
        assert!(ConnectionState::Closed.accepts_attempt());
        assert!(ConnectionState::Failed.accepts_attempt());
        assert!(!ConnectionState::Connecting.accepts_attempt());
        assert!(!ConnectionState::Open.accepts_attempt());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ConnectionState::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
        assert_eq!(ConnectionState::Open.to_string(), "open");
    }
}
