//! Benchmark Configuration
//!
//! Settings for a boot-time run:
//! - Repetition count
//! - Per-step timeouts
//! - System image used when creating devices
//! - Emulator serial and the activities launched after boot

use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{BenchError, Result};

/// Timeouts for each supervised step, in milliseconds
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// `emulator -accel-check`
    pub accel_check_ms: u64,
    /// `emulator -list-avds`
    pub list_avds_ms: u64,
    /// `sdkmanager --install`
    pub install_image_ms: u64,
    /// `avdmanager create avd`
    pub create_avd_ms: u64,
    /// Pause between device creation and the existence re-check
    pub create_settle_ms: u64,
    /// Emulator launch until the boot time line
    pub boot_ms: u64,
    /// `adb shell am start`
    pub app_launch_ms: u64,
    /// `adb emu kill`
    pub kill_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            accel_check_ms: 1_000,
            list_avds_ms: 10_000,
            install_image_ms: 600_000,
            create_avd_ms: 10_000,
            create_settle_ms: 5_000,
            boot_ms: 300_000,
            app_launch_ms: 5_000,
            kill_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn accel_check(&self) -> Duration {
        Duration::from_millis(self.accel_check_ms)
    }

    pub fn list_avds(&self) -> Duration {
        Duration::from_millis(self.list_avds_ms)
    }

    pub fn install_image(&self) -> Duration {
        Duration::from_millis(self.install_image_ms)
    }

    pub fn create_avd(&self) -> Duration {
        Duration::from_millis(self.create_avd_ms)
    }

    pub fn create_settle(&self) -> Duration {
        Duration::from_millis(self.create_settle_ms)
    }

    pub fn boot(&self) -> Duration {
        Duration::from_millis(self.boot_ms)
    }

    pub fn app_launch(&self) -> Duration {
        Duration::from_millis(self.app_launch_ms)
    }

    pub fn kill(&self) -> Duration {
        Duration::from_millis(self.kill_ms)
    }
}

/// System image and device profile used for AVD creation
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SystemImageConfig {
    /// sdkmanager package id
    pub package: String,
    /// `--abi` value for avdmanager
    pub abi: String,
    /// `--device` value for the Pixel profile
    pub pixel_device: String,
    /// Skin appended to config.ini for skinned devices
    pub skin: String,
}

impl Default for SystemImageConfig {
    fn default() -> Self {
        Self {
            package: "system-images;android-29;google_apis_playstore;x86".to_string(),
            abi: "google_apis_playstore/x86".to_string(),
            pixel_device: "pixel".to_string(),
            skin: "pixel_2".to_string(),
        }
    }
}

/// Emulator instance targeted by adb
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Console serial of the launched emulator
    pub serial: String,
    /// Activities started after boot, cycled by repetition index
    pub activities: Vec<String>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            serial: "emulator-5554".to_string(),
            activities: vec![
                "com.google.android.apps.photos/.home.HomeActivity".to_string(),
                "com.android.settings/.wifi.WifiStatusTest".to_string(),
            ],
        }
    }
}

/// Main benchmark configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BenchConfig {
    /// Boot measurements per configuration
    pub execution_times: u32,
    pub timeouts: TimeoutConfig,
    pub system_image: SystemImageConfig,
    pub emulator: EmulatorConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            execution_times: 1,
            timeouts: TimeoutConfig::default(),
            system_image: SystemImageConfig::default(),
            emulator: EmulatorConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        info!("Loading configuration from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let config: BenchConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.emulator.activities.is_empty() {
            return Err(BenchError::Config("emulator.activities must not be empty".into()));
        }
        if self.emulator.serial.trim().is_empty() {
            return Err(BenchError::Config("emulator.serial must not be empty".into()));
        }
        Ok(())
    }

    /// Override the repetition count
    pub fn with_execution_times(mut self, execution_times: u32) -> Self {
        self.execution_times = execution_times;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();
        assert_eq!(config.execution_times, 1);
        assert_eq!(config.timeouts.boot(), Duration::from_secs(300));
        assert_eq!(config.timeouts.install_image(), Duration::from_secs(600));
        assert_eq!(config.emulator.serial, "emulator-5554");
        assert_eq!(config.emulator.activities.len(), 2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "execution_times = 5\n\n[timeouts]\nboot_ms = 1000\n").unwrap();

        let config = BenchConfig::load(&path).unwrap();
        assert_eq!(config.execution_times, 5);
        assert_eq!(config.timeouts.boot_ms, 1000);
        assert_eq!(config.timeouts.kill_ms, 30_000);
        assert_eq!(config.system_image, SystemImageConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BenchConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, BenchConfig::default());
    }

    #[test]
    fn test_empty_activities_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[emulator]\nactivities = []\n").unwrap();

        assert!(matches!(BenchConfig::load(&path), Err(BenchError::Config(_))));
    }
}
