//! Events published by the connection manager

use serde::Serialize;
use serde_json::Value;

use super::ConnectionState;

/// Notification delivered to every current subscriber
///
/// Serializes as a JSON object tagged by `type`, e.g.
/// `{"type":"connection_failed","reason":"refused","attempt":2}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// The socket is open (or was already open when the subscriber joined)
    Connected,
    /// An open socket closed
    Disconnected,
    /// A decoded inbound frame
    MessageReceived { payload: Value },
    /// An attempt ended before the socket opened
    ConnectionFailed { reason: String, attempt: u64 },
    /// An inbound frame could not be decoded; the connection stays up
    PayloadRejected { raw: String, reason: String },
    /// The subscriber fell behind and `missed` events were dropped for it;
    /// `state` is the connection state at the time it caught up
    Lagged { missed: u64, state: ConnectionState },
}

impl ConnectionEvent {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected => "connected",
            ConnectionEvent::Disconnected => "disconnected",
            ConnectionEvent::MessageReceived { .. } => "message_received",
            ConnectionEvent::ConnectionFailed { .. } => "connection_failed",
            ConnectionEvent::PayloadRejected { .. } => "payload_rejected",
            ConnectionEvent::Lagged { .. } => "lagged",
        }
    }

    /// Whether the event reports a problem
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ConnectionEvent::ConnectionFailed { .. } | ConnectionEvent::PayloadRejected { .. }
        )
    }
}
