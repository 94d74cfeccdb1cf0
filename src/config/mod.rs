//! Configuration module
//!
//! Endpoint definition and manager settings loaded from TOML.

mod endpoint;
mod settings;

pub use endpoint::*;
pub use settings::*;
