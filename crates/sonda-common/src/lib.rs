//! Common types and utilities shared across all Sonda components:
//! - Wire types for measurement requests, progress and results
//! - Control-channel event envelopes and the per-request reporter
//! - Private address-space classification
//! - Configuration management
//! - Logging infrastructure
//! - Error types

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod net;
pub mod types;

pub use config::*;
pub use error::*;
pub use events::*;
pub use net::is_private_ip;
pub use types::*;

/// Version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
