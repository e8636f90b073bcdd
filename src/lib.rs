//! checkboottimes - Android emulator boot time benchmark
//!
//! Boots freshly created virtual devices cold and warm and reports the
//! average boot time the emulator prints for each.
//!
//! ## Architecture
//!
//! - `checkboottimes-core`: configuration and error taxonomy
//! - `checkboottimes-android-toolchain`: SDK tool discovery
//! - `checkboottimes-emulator-bridge`: supervised emulator, avdmanager and adb runs

#![warn(clippy::all)]

pub mod boot_timing;
pub mod cli;

pub use checkboottimes_android_toolchain as toolchain;
pub use checkboottimes_core as core;
pub use checkboottimes_emulator_bridge as emulator;

pub use boot_timing::{BootTimeSummary, BootTimingDriver};
