//! WebSocket connection lifecycle manager
//!
//! A [`ConnectionManager`] owns the one socket to an endpoint. Callers can
//! start it without waiting, wait for it with a deadline, or take a shared
//! event stream that connects in the background; concurrent requests share a
//! single attempt.
//!
//! ```ignore
//! let manager = Arc::new(ConnectionManager::with_websocket(config));
//! let mut events = manager.stream();
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod config;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use config::{Endpoint, ManagerConfig};
pub use manager::{
    ConnectError, ConnectResult, ConnectionEvent, ConnectionManager, ConnectionState, SendError,
    Subscription,
};
pub use transport::{SimulatedTransport, Transport, WebSocketTransport};
