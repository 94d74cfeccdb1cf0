//! Connection manager errors

use std::time::Duration;
use thiserror::Error;

use super::ConnectionState;
use crate::protocol::ProtocolError;

/// Why a connection attempt did not reach the open state
///
/// Cloneable so that one attempt's outcome can settle every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Connection attempt {attempt} failed: {reason}")]
    EstablishmentFailed { attempt: u64, reason: String },

    #[error("Connection attempt {attempt} timed out after {}ms", .deadline.as_millis())]
    EstablishmentTimedOut { attempt: u64, deadline: Duration },

    #[error("Connection attempt {attempt} aborted by disconnect")]
    Aborted { attempt: u64 },
}

impl ConnectError {
    /// The attempt this error belongs to
    pub fn attempt(&self) -> u64 {
        match self {
            ConnectError::EstablishmentFailed { attempt, .. }
            | ConnectError::EstablishmentTimedOut { attempt, .. }
            | ConnectError::Aborted { attempt } => *attempt,
        }
    }

    /// Whether the deadline expired
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectError::EstablishmentTimedOut { .. })
    }

    /// Reason text carried by the `ConnectionFailed` event
    pub fn reason(&self) -> String {
        match self {
            ConnectError::EstablishmentFailed { reason, .. } => reason.clone(),
            ConnectError::EstablishmentTimedOut { deadline, .. } => {
                format!("timed out after {}ms", deadline.as_millis())
            }
            ConnectError::Aborted { .. } => "aborted by disconnect".to_string(),
        }
    }
}

/// Result type for connection attempts
pub type ConnectResult<T> = Result<T, ConnectError>;

/// Errors returned by `send`
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Cannot send: connection is {state}")]
    Rejected { state: ConnectionState },

    #[error("Cannot send: connection is closing")]
    LinkClosed,

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] ProtocolError),
}
