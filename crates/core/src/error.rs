//! Error types for checkboottimes
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for a boot-time benchmark run
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("{0} not on path.")]
    MissingTool(String),

    #[error("unable to detect acceleration type.")]
    AccelerationCheckFailed,

    #[error("unable to create {0} virtual device.")]
    DeviceCreateFailed(String),

    #[error("unable to update {0} with skin.")]
    DeviceUpdateFailed(String),

    #[error("no boot time obtained for {device} ({mode} boot, {requested} request(s), {hardware_errors} acceleration error(s))")]
    NoSamplesObtained {
        device: String,
        mode: String,
        requested: u32,
        hardware_errors: u32,
    },

    #[error("Process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;

impl BenchError {
    /// Whether this error aborts the whole benchmark.
    ///
    /// Process errors from best-effort steps (activity launch, emulator
    /// kill) are logged and skipped.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BenchError::Process(_))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            BenchError::Io(e) => format!("File operation failed: {}", e),
            BenchError::Config(msg) => format!("Configuration error: {}", msg),
            BenchError::TomlParse(e) => format!("Invalid configuration file: {}", e),
            _ => self.to_string(),
        }
    }
}
