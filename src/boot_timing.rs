//! Boot Timing Driver
//!
//! Runs the measurement sequence: tool discovery, acceleration check,
//! device setup, then repeated cold and warm boots per device profile.

use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use checkboottimes_android_toolchain::{AndroidTools, DetectionError, ToolLocator};
use checkboottimes_core::{BenchConfig, BenchError, Result};
use checkboottimes_emulator_bridge::{
    AdbClient, AvdManager, BootMode, BootTimeCollector, DeviceProfile, EmulatorLauncher,
    ProcessSupervisor, RunResult, SupervisorError,
};

/// Profiles measured, in order
pub const PROFILES: [DeviceProfile; 2] = [DeviceProfile::GENERIC, DeviceProfile::PIXEL_WITH_SKIN];

/// Boot modes measured per profile, in order
pub const MODES: [BootMode; 2] = [BootMode::Cold, BootMode::Warm];

/// Aggregated boot times of one device and mode
#[derive(Debug, Clone, PartialEq)]
pub struct BootTimeSummary {
    pub device: String,
    pub mode: BootMode,
    /// Boot times in milliseconds
    pub samples: Vec<f64>,
    /// Repetitions asked for
    pub requested: u32,
    /// Repetitions that hit the hardware acceleration error
    pub hardware_errors: u32,
}

impl BootTimeSummary {
    /// Mean boot time, `None` without samples
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Repetitions that produced a sample
    pub fn successful(&self) -> usize {
        self.samples.len()
    }
}

impl fmt::Display for BootTimeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Average {} Boot Time for {} run(s) out of {} request(s): ",
            self.device,
            self.mode,
            self.successful(),
            self.requested
        )?;
        match self.average() {
            Some(average) => write!(f, "{} ms", average),
            None => f.write_str("n/a"),
        }
    }
}

/// Verify that every SDK tool is available
pub fn tools_exist(locator: &ToolLocator) -> Result<AndroidTools> {
    locator.locate_all().map_err(|err| match err {
        DetectionError::ToolNotFound(tool) => BenchError::MissingTool(tool.name().to_string()),
    })
}

/// Locate the tools, then run the full measurement sequence
pub async fn run(locator: &ToolLocator, home: &Path, config: BenchConfig) -> Result<Vec<BootTimeSummary>> {
    let tools = tools_exist(locator)?;
    BootTimingDriver::new(&tools, home, config).run().await
}

/// Drives supervised tool runs one after another
pub struct BootTimingDriver {
    config: BenchConfig,
    avd: AvdManager,
    emulator: EmulatorLauncher,
    adb: AdbClient,
}

impl BootTimingDriver {
    pub fn new(tools: &AndroidTools, home: &Path, config: BenchConfig) -> Self {
        let supervisor = ProcessSupervisor::new();
        Self {
            avd: AvdManager::new(tools, home, config.system_image.clone(), supervisor.clone()),
            emulator: EmulatorLauncher::new(tools.emulator.clone(), supervisor.clone()),
            adb: AdbClient::new(tools.adb.clone(), supervisor),
            config,
        }
    }

    /// Acceleration check, then every profile in cold and warm mode
    pub async fn run(&self) -> Result<Vec<BootTimeSummary>> {
        self.check_acceleration().await?;

        let mut summaries = Vec::with_capacity(PROFILES.len() * MODES.len());
        for profile in PROFILES {
            let device = self.ensure_virtual_device(profile).await?;
            for mode in MODES {
                summaries.push(self.measure_boot_time(&device, mode).await?);
            }
        }

        Ok(summaries)
    }

    /// Report the host's acceleration type; fatal when it cannot be read
    pub async fn check_acceleration(&self) -> Result<Vec<String>> {
        let lines = self
            .emulator
            .check_acceleration(self.config.timeouts.accel_check())
            .await?
            .ok_or(BenchError::AccelerationCheckFailed)?;

        info!("Acceleration type: {}", lines.join(", "));
        Ok(lines)
    }

    /// Whether the emulator lists a device called `name`
    pub async fn device_exists(&self, name: &str) -> Result<bool> {
        Ok(self.avd.exists(name, self.config.timeouts.list_avds()).await?)
    }

    /// Make sure the device for `profile` exists, creating it if needed.
    ///
    /// Returns the device name.
    pub async fn ensure_virtual_device(&self, profile: DeviceProfile) -> Result<String> {
        let name = profile.name();
        if self.device_exists(&name).await? {
            debug!("{} virtual device found", name);
            return Ok(name);
        }

        info!("{} virtual device not found.", name);
        self.create_virtual_device(profile, &name).await?;
        Ok(name)
    }

    async fn create_virtual_device(&self, profile: DeviceProfile, name: &str) -> Result<()> {
        let timeouts = &self.config.timeouts;
        info!("Creating {} virtual device.", name);

        let installed = self.avd.install_system_image(timeouts.install_image()).await?;
        if !installed.is_completed() {
            warn!("System image install did not report completion ({:?})", installed);
        }

        let (created, transcript) = self.avd.create(profile, timeouts.create_avd()).await?;
        debug!("avdmanager finished: {:?}", created);
        tokio::time::sleep(timeouts.create_settle()).await;

        if !self.device_exists(name).await? {
            for line in transcript.lines() {
                warn!("{}", line);
            }
            return Err(BenchError::DeviceCreateFailed(name.to_string()));
        }

        if profile.use_skin && !self.avd.append_skin(name).await? {
            return Err(BenchError::DeviceUpdateFailed(name.to_string()));
        }

        info!("{} virtual device created.", name);
        Ok(())
    }

    /// Boot `device` `execution_times` times and average the reported
    /// boot times. No sample at all is fatal.
    pub async fn measure_boot_time(&self, device: &str, mode: BootMode) -> Result<BootTimeSummary> {
        let timeouts = &self.config.timeouts;
        let activities = &self.config.emulator.activities;
        let requested = self.config.execution_times;
        let mut collector = BootTimeCollector::default();

        for i in 0..requested {
            debug!("{} {} boot {}/{}", device, mode, i + 1, requested);

            match self.emulator.boot(device, mode, timeouts.boot(), &mut collector).await {
                Ok(RunResult::Completed) => {}
                Ok(RunResult::ClassifierError) => warn!("{} failed to boot", device),
                Ok(RunResult::TimedOut) => {
                    warn!("{} reported no boot time within {:?}", device, timeouts.boot())
                }
                Err(e) => skip_step("Emulator launch", e)?,
            }

            if let Some(activity) = activities.get(i as usize % activities.len().max(1)) {
                match self.adb.start_activity(activity, timeouts.app_launch()).await {
                    Ok(result) => debug!("Started {}: {:?}", activity, result),
                    Err(e) => skip_step("Activity launch", e)?,
                }
            }

            self.kill_emulator().await?;
        }

        let (samples, hardware_errors) = collector.into_parts();
        let summary = BootTimeSummary {
            device: device.to_string(),
            mode,
            samples,
            requested,
            hardware_errors,
        };

        if summary.hardware_errors > 0 {
            warn!("Unable to boot emulator {} time(s)", summary.hardware_errors);
        }

        if summary.average().is_none() {
            return Err(BenchError::NoSamplesObtained {
                device: summary.device,
                mode: mode.label().to_string(),
                requested,
                hardware_errors: summary.hardware_errors,
            });
        }

        info!("{}", summary);
        Ok(summary)
    }

    /// Shut the emulator down; an unconfirmed kill is logged only
    async fn kill_emulator(&self) -> Result<()> {
        let serial = &self.config.emulator.serial;
        match self.adb.kill_emulator(serial, self.config.timeouts.kill()).await {
            Ok(RunResult::Completed) => Ok(()),
            Ok(_) => {
                warn!("unable to quit emulator.");
                Ok(())
            }
            Err(e) => skip_step("Emulator kill", e),
        }
    }
}

/// Log a failed repetition sub-step; only fatal errors propagate
fn skip_step(step: &str, err: SupervisorError) -> Result<()> {
    let err = BenchError::from(err);
    if err.is_fatal() {
        return Err(err);
    }
    warn!("{} failed, skipping: {}", step, err);
    Ok(())
}
