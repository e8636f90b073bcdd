//! Environment Helpers
//!
//! Resolves the user's home directory and the AVD home below it.

use std::path::{Path, PathBuf};

/// Resolve the current user's home directory.
///
/// Windows uses `%HOMEDRIVE%%HOMEPATH%` (then `USERPROFILE`), other
/// platforms use `HOME`. Falls back to the platform lookup of `dirs`.
pub fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        let drive = std::env::var_os("HOMEDRIVE");
        let path = std::env::var_os("HOMEPATH");
        if let (Some(drive), Some(path)) = (drive, path) {
            let mut home = drive;
            home.push(path);
            return Some(PathBuf::from(home));
        }
        if let Some(profile) = std::env::var_os("USERPROFILE") {
            return Some(PathBuf::from(profile));
        }
    }
    #[cfg(not(windows))]
    {
        if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
            return Some(PathBuf::from(home));
        }
    }

    dirs::home_dir()
}

/// Directory holding `<name>.avd` folders
pub fn avd_home(home: &Path) -> PathBuf {
    home.join(".android").join("avd")
}

/// `config.ini` of a named virtual device
pub fn avd_config_path(home: &Path, device_name: &str) -> PathBuf {
    avd_home(home).join(format!("{}.avd", device_name)).join("config.ini")
}
