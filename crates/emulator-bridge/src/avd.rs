//! AVD (Android Virtual Device) Manager
//!
//! Checks for, creates and skins the virtual devices the benchmark boots.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use checkboottimes_android_toolchain::{avd_config_path, AndroidTools};
use checkboottimes_core::SystemImageConfig;

use crate::contains_ignore_case;
use crate::supervisor::{CommandSpec, Decision, LineClassifier, ProcessSupervisor, RunResult, SupervisorError};

/// Base name of every benchmark device
pub const DEVICE_NAME_PREFIX: &str = "XamarinPerfTest";

/// avdmanager prompt shown once the device files are written
pub const CUSTOM_PROFILE_PROMPT: &str = "Do you wish to create a custom hardware profile?";

/// avdmanager progress line shown before the prompt
pub const REPOSITORY_FETCHED: &str = "100% Fetch remote repository...";

/// sdkmanager progress marker for a finished install
pub const INSTALL_COMPLETE: &str = "100%";

/// Device profile, named deterministically from its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub use_skin: bool,
    pub use_pixel_device: bool,
}

impl DeviceProfile {
    /// Generic hardware, no skin
    pub const GENERIC: DeviceProfile = DeviceProfile {
        use_skin: false,
        use_pixel_device: false,
    };

    /// Pixel hardware profile with the Pixel skin
    pub const PIXEL_WITH_SKIN: DeviceProfile = DeviceProfile {
        use_skin: true,
        use_pixel_device: true,
    };

    pub fn name(&self) -> String {
        let mut name = DEVICE_NAME_PREFIX.to_string();
        if self.use_pixel_device {
            name.push_str("Pixel");
        }
        if self.use_skin {
            name.push_str("WithSkin");
        }
        name
    }
}

/// Records avdmanager output and completes once creation got far enough
#[derive(Debug, Default)]
pub struct CreateTranscript {
    lines: Vec<String>,
}

impl CreateTranscript {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl LineClassifier for CreateTranscript {
    fn classify(&mut self, line: Option<&str>) -> Decision {
        let Some(line) = line else {
            return Decision::Continue;
        };
        self.lines.push(line.to_string());

        if contains_ignore_case(line, CUSTOM_PROFILE_PROMPT) || contains_ignore_case(line, REPOSITORY_FETCHED) {
            Decision::Complete
        } else {
            Decision::Continue
        }
    }
}

/// AVD Manager
#[derive(Debug, Clone)]
pub struct AvdManager {
    emulator: PathBuf,
    avdmanager: PathBuf,
    sdkmanager: PathBuf,
    sdk_root: PathBuf,
    home: PathBuf,
    image: SystemImageConfig,
    supervisor: ProcessSupervisor,
}

impl AvdManager {
    /// Create a new AVD manager
    pub fn new(tools: &AndroidTools, home: &Path, image: SystemImageConfig, supervisor: ProcessSupervisor) -> Self {
        Self {
            emulator: tools.emulator.clone(),
            avdmanager: tools.avdmanager.clone(),
            sdkmanager: tools.sdkmanager.clone(),
            sdk_root: tools.sdk_root(),
            home: home.to_path_buf(),
            image,
            supervisor,
        }
    }

    /// `config.ini` of a device
    pub fn config_path(&self, name: &str) -> PathBuf {
        avd_config_path(&self.home, name)
    }

    pub fn list_avds_command(&self) -> CommandSpec {
        CommandSpec::new(&self.emulator).arg("-list-avds")
    }

    pub fn install_command(&self) -> CommandSpec {
        CommandSpec::shell(format!(
            "{} --install {}",
            shell_quote(&self.sdkmanager.to_string_lossy()),
            shell_quote(&self.image.package)
        ))
    }

    pub fn create_command(&self, profile: DeviceProfile) -> CommandSpec {
        let mut script = format!(
            "echo no | {} create avd --force --name {} --abi {} --package {}",
            shell_quote(&self.avdmanager.to_string_lossy()),
            profile.name(),
            shell_quote(&self.image.abi),
            shell_quote(&self.image.package)
        );
        if profile.use_pixel_device {
            script.push_str(&format!(" --device {}", shell_quote(&self.image.pixel_device)));
        }
        CommandSpec::shell(script)
    }

    /// Whether `emulator -list-avds` reports `name`
    pub async fn exists(&self, name: &str, timeout: Duration) -> Result<bool, SupervisorError> {
        let mut listed = |line: Option<&str>| match line {
            Some(line) if line == name => Decision::Complete,
            _ => Decision::Continue,
        };

        let result = self
            .supervisor
            .run(&self.list_avds_command(), timeout, &mut listed)
            .await?;
        debug!("{} listed: {:?}", name, result);
        Ok(result.is_completed())
    }

    /// Install the system image used for new devices
    pub async fn install_system_image(&self, timeout: Duration) -> Result<RunResult, SupervisorError> {
        info!("Installing {}", self.image.package);
        let mut installed = |line: Option<&str>| match line {
            Some(line) if line.contains(INSTALL_COMPLETE) => Decision::Complete,
            _ => Decision::Continue,
        };

        self.supervisor
            .run(&self.install_command(), timeout, &mut installed)
            .await
    }

    /// Run avdmanager for `profile`, answering "no" to the custom profile
    /// prompt. The transcript is kept for diagnostics.
    pub async fn create(
        &self,
        profile: DeviceProfile,
        timeout: Duration,
    ) -> Result<(RunResult, CreateTranscript), SupervisorError> {
        let mut transcript = CreateTranscript::default();
        let result = self
            .supervisor
            .run(&self.create_command(profile), timeout, &mut transcript)
            .await?;
        Ok((result, transcript))
    }

    /// Append the skin settings to the device's `config.ini`.
    ///
    /// Returns `false` when the device has no `config.ini`.
    pub async fn append_skin(&self, name: &str) -> std::io::Result<bool> {
        let path = self.config_path(name);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(false);
        }

        let skin = &self.image.skin;
        let skin_path = self.sdk_root.join("skins").join(skin);
        let content = format!(
            "skin.name={}\nskin.dynamic=yes\nskin.path={}\n",
            skin,
            skin_path.display()
        );

        let mut file = tokio::fs::OpenOptions::new().append(true).open(&path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        info!("Applied skin {} to {}", skin, name);
        Ok(true)
    }
}

#[cfg(windows)]
fn shell_quote(value: &str) -> String {
    format!("\"{}\"", value)
}

#[cfg(not(windows))]
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use configparser::ini::Ini;

    fn manager(home: &Path) -> AvdManager {
        let tools = AndroidTools {
            adb: PathBuf::from("/sdk/platform-tools/adb"),
            avdmanager: PathBuf::from("/sdk/tools/bin/avdmanager"),
            emulator: PathBuf::from("/sdk/emulator/emulator"),
            sdkmanager: PathBuf::from("/sdk/tools/bin/sdkmanager"),
        };
        AvdManager::new(&tools, home, SystemImageConfig::default(), ProcessSupervisor::new())
    }

    #[test]
    fn test_device_names() {
        let name = |use_skin, use_pixel_device| DeviceProfile { use_skin, use_pixel_device }.name();
        assert_eq!(name(false, false), "XamarinPerfTest");
        assert_eq!(name(false, true), "XamarinPerfTestPixel");
        assert_eq!(name(true, false), "XamarinPerfTestWithSkin");
        assert_eq!(name(true, true), "XamarinPerfTestPixelWithSkin");
        assert_eq!(DeviceProfile::PIXEL_WITH_SKIN.name(), "XamarinPerfTestPixelWithSkin");
    }

    #[cfg(unix)]
    #[test]
    fn test_create_command_quotes_package() {
        let dir = tempfile::tempdir().unwrap();
        let command = manager(dir.path()).create_command(DeviceProfile::PIXEL_WITH_SKIN);
        assert_eq!(command.program, PathBuf::from("bash"));
        assert_eq!(
            command.args[1],
            "echo no | '/sdk/tools/bin/avdmanager' create avd --force --name XamarinPerfTestPixelWithSkin \
             --abi 'google_apis_playstore/x86' --package 'system-images;android-29;google_apis_playstore;x86' \
             --device 'pixel'"
        );
    }

    #[test]
    fn test_generic_profile_has_no_device_flag() {
        let dir = tempfile::tempdir().unwrap();
        let command = manager(dir.path()).create_command(DeviceProfile::GENERIC);
        assert!(!command.args.last().unwrap().contains("--device"));
    }

    #[test]
    fn test_transcript_completes_on_prompt() {
        let mut transcript = CreateTranscript::default();
        assert_eq!(transcript.classify(Some("Loading local repository...")), Decision::Continue);
        assert_eq!(
            transcript.classify(Some("Do you wish to create a custom hardware profile? [no]")),
            Decision::Complete
        );
        assert_eq!(transcript.lines().len(), 2);
    }

    #[tokio::test]
    async fn test_append_skin() {
        let home = tempfile::tempdir().unwrap();
        let manager = manager(home.path());
        let config = manager.config_path("XamarinPerfTestPixelWithSkin");
        std::fs::create_dir_all(config.parent().unwrap()).unwrap();
        std::fs::write(&config, "hw.lcd.density=420\n").unwrap();

        assert!(manager.append_skin("XamarinPerfTestPixelWithSkin").await.unwrap());

        let mut ini = Ini::new();
        ini.load(&config).unwrap();
        assert_eq!(ini.get("default", "hw.lcd.density").as_deref(), Some("420"));
        assert_eq!(ini.get("default", "skin.name").as_deref(), Some("pixel_2"));
        assert_eq!(ini.get("default", "skin.dynamic").as_deref(), Some("yes"));
        let skin_path = PathBuf::from("/sdk").join("skins").join("pixel_2");
        assert_eq!(ini.get("default", "skin.path"), Some(skin_path.display().to_string()));
    }

    #[tokio::test]
    async fn test_append_skin_without_config() {
        let home = tempfile::tempdir().unwrap();
        assert!(!manager(home.path()).append_skin("XamarinPerfTest").await.unwrap());
    }
}
