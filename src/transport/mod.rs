//! Transport module
//!
//! The manager never touches a socket directly. A [`Transport`] opens a link
//! to an endpoint and reports what happens on it as [`TransportEvent`]s; the
//! manager drives it with [`TransportCommand`]s.

mod simulated;
mod websocket;

pub use simulated::*;
pub use websocket::*;

use tokio::sync::mpsc;

use crate::config::Endpoint;

/// Notification from a live or opening link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Opened,
    /// A text frame arrived
    Message(String),
    /// Transport-level error; the link is dead afterwards
    Error(String),
    /// The link closed (remotely or after a local close request)
    Closed { reason: Option<String> },
}

impl TransportEvent {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Opened => "opened",
            TransportEvent::Message(_) => "message",
            TransportEvent::Error(_) => "error",
            TransportEvent::Closed { .. } => "closed",
        }
    }
}

/// Instruction sent to a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Write a text frame
    Send(String),
    /// Close the link; dropping the command sender has the same effect
    Close,
}

/// Manager side of one link
pub struct TransportLink {
    /// Events in the order the transport observed them
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Commands for the link
    pub commands: mpsc::UnboundedSender<TransportCommand>,
}

/// Transport side of one link
pub struct TransportPeer {
    /// Where to report events
    pub events: mpsc::UnboundedSender<TransportEvent>,
    /// Commands from the manager
    pub commands: mpsc::UnboundedReceiver<TransportCommand>,
}

impl TransportPeer {
    /// Report an event; returns false once the manager stopped listening
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Create the two halves of a link
pub fn link() -> (TransportLink, TransportPeer) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    (
        TransportLink {
            events: event_rx,
            commands: command_tx,
        },
        TransportPeer {
            events: event_tx,
            commands: command_rx,
        },
    )
}

/// Something that can open links to an endpoint
///
/// `open` must return immediately; establishment happens in the background
/// and is reported through the link's events. Each call creates exactly one
/// underlying connection.
pub trait Transport: Send + Sync + 'static {
    /// Start opening a link
    fn open(&self, endpoint: &Endpoint) -> TransportLink;
}
