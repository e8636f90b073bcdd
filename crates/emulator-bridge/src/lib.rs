//! Android Emulator Bridge
//!
//! Supervised runs of the emulator, avdmanager, sdkmanager and adb tools.

pub mod adb;
pub mod avd;
pub mod emulator;
pub mod supervisor;

pub use adb::{AdbClient, AdbCommand};
pub use avd::{AvdManager, CreateTranscript, DeviceProfile};
pub use emulator::{AccelCheck, BootMode, BootTimeCollector, EmulatorLauncher, EmulatorOptions};
pub use supervisor::{CommandSpec, Decision, LineClassifier, ProcessSupervisor, RunResult, SupervisorError};

/// Case-insensitive (ASCII) prefix test
pub(crate) fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

/// Case-insensitive (ASCII) suffix test
pub(crate) fn ends_with_ignore_case(line: &str, suffix: &str) -> bool {
    line.len() >= suffix.len()
        && line
            .get(line.len() - suffix.len()..)
            .map_or(false, |tail| tail.eq_ignore_ascii_case(suffix))
}

/// Case-insensitive (ASCII) substring test
pub(crate) fn contains_ignore_case(line: &str, needle: &str) -> bool {
    line.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}
