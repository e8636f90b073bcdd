//! Android Toolchain Discovery
//!
//! Handles detection of:
//! - adb, avdmanager, emulator and sdkmanager executables
//! - the user's home directory and AVD home

pub mod detector;
pub mod env;

pub use detector::{AndroidTool, AndroidTools, DetectionError, ToolLocator};
pub use env::{avd_config_path, avd_home, home_dir};
