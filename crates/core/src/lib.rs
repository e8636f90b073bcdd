//! checkboottimes Core - shared types
//!
//! Configuration and the error taxonomy used by every step of a
//! boot-time measurement.

pub mod config;
pub mod error;

pub use config::{BenchConfig, EmulatorConfig, SystemImageConfig, TimeoutConfig};
pub use error::{BenchError, Result};

/// checkboottimes version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "checkboottimes";
