//! Connection manager module
//!
//! Owns the single socket for an endpoint, deduplicates connection attempts
//! and fans connection events out to independent subscribers.

mod connection;
mod error;
mod event;
mod state;
mod subscription;

pub use connection::*;
pub use error::*;
pub use event::*;
pub use state::*;
pub use subscription::*;
