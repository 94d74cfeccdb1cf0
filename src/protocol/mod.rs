//! Wire protocol module
//!
//! Text frames exchanged with the remote endpoint are JSON documents.

mod frame;

pub use frame::*;
