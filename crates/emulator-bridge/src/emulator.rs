//! Emulator Launcher
//!
//! Launches emulator instances under supervision and reads the boot time
//! the emulator reports in its log.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::supervisor::{CommandSpec, Decision, LineClassifier, ProcessSupervisor, RunResult, SupervisorError};
use crate::{ends_with_ignore_case, starts_with_ignore_case};

/// Printed when the host cannot run x86 images
pub const HARDWARE_ACCELERATION_ERROR: &str =
    "emulator: ERROR: x86 emulation currently requires hardware acceleration!";

/// Prefix of the line carrying the boot duration
pub const BOOT_TIME_MARKER: &str = "emulator: INFO: boot time";

static BOOT_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^emulator: INFO: boot time\s+([0-9]+(?:\.[0-9]+)?)").expect("boot time pattern")
});

/// Boot flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// No snapshot load, data wiped
    Cold,
    /// Normal launch, may resume from a snapshot
    Warm,
}

impl BootMode {
    /// Label used in the summary line
    pub fn label(&self) -> &'static str {
        match self {
            BootMode::Cold => "Cold",
            BootMode::Warm => "Hot",
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Emulator launch options
#[derive(Debug, Clone, Default)]
pub struct EmulatorOptions {
    /// Wipe data on launch
    pub wipe_data: bool,
    /// Skip loading the quick-boot snapshot
    pub cold_boot: bool,
}

impl EmulatorOptions {
    pub fn for_mode(mode: BootMode) -> Self {
        match mode {
            BootMode::Cold => Self {
                wipe_data: true,
                cold_boot: true,
            },
            BootMode::Warm => Self::default(),
        }
    }

    /// Convert to command line arguments
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.cold_boot {
            args.push("-no-snapshot-load".to_string());
        }

        if self.wipe_data {
            args.push("-wipe-data".to_string());
        }

        args
    }
}

/// Collects the lines of `emulator -accel-check`.
///
/// Output ends with a line reading `accel`; lines starting with `accel` are
/// framing and not collected.
#[derive(Debug, Default)]
pub struct AccelCheck {
    lines: Vec<String>,
}

impl AccelCheck {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl LineClassifier for AccelCheck {
    fn classify(&mut self, line: Option<&str>) -> Decision {
        let Some(line) = line.filter(|l| !l.trim().is_empty()) else {
            return Decision::Continue;
        };

        if !starts_with_ignore_case(line, "accel") {
            self.lines.push(line.to_string());
        }

        if ends_with_ignore_case(line, "accel") {
            Decision::Complete
        } else {
            Decision::Continue
        }
    }
}

/// Accumulates boot time samples and acceleration failures across the
/// repetitions of one measurement.
#[derive(Debug, Default)]
pub struct BootTimeCollector {
    samples: Vec<f64>,
    hardware_errors: u32,
}

impl BootTimeCollector {
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn hardware_errors(&self) -> u32 {
        self.hardware_errors
    }

    pub fn into_parts(self) -> (Vec<f64>, u32) {
        (self.samples, self.hardware_errors)
    }
}

impl LineClassifier for BootTimeCollector {
    fn classify(&mut self, line: Option<&str>) -> Decision {
        let Some(line) = line.filter(|l| !l.trim().is_empty()) else {
            return Decision::Continue;
        };

        if starts_with_ignore_case(line, HARDWARE_ACCELERATION_ERROR) {
            warn!("{}", line);
            self.hardware_errors += 1;
            return Decision::Error;
        }

        if starts_with_ignore_case(line, BOOT_TIME_MARKER) {
            match parse_boot_time(line) {
                Some(ms) => {
                    debug!("Boot time sample: {} ms", ms);
                    self.samples.push(ms);
                    return Decision::Complete;
                }
                None => warn!("Unparseable boot time line: {}", line),
            }
        }

        Decision::Continue
    }
}

/// Extract the milliseconds from `emulator: INFO: boot time 12345 ms`
pub fn parse_boot_time(line: &str) -> Option<f64> {
    BOOT_TIME
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Emulator launcher
#[derive(Debug, Clone)]
pub struct EmulatorLauncher {
    emulator: PathBuf,
    supervisor: ProcessSupervisor,
}

impl EmulatorLauncher {
    /// Create a new emulator launcher
    pub fn new(emulator: PathBuf, supervisor: ProcessSupervisor) -> Self {
        Self { emulator, supervisor }
    }

    pub fn accel_check_command(&self) -> CommandSpec {
        CommandSpec::new(&self.emulator).arg("-accel-check")
    }

    pub fn launch_command(&self, avd_name: &str, options: &EmulatorOptions) -> CommandSpec {
        CommandSpec::new(&self.emulator)
            .arg("-avd")
            .arg(avd_name)
            .args(options.to_args())
    }

    /// Run the acceleration check.
    ///
    /// Returns the reported acceleration lines, or `None` when the check
    /// did not finish in time.
    pub async fn check_acceleration(
        &self,
        timeout: Duration,
    ) -> Result<Option<Vec<String>>, SupervisorError> {
        let mut check = AccelCheck::default();
        let result = self
            .supervisor
            .run(&self.accel_check_command(), timeout, &mut check)
            .await?;

        Ok(result.is_completed().then(|| check.into_lines()))
    }

    /// Launch `avd_name` and wait for its boot time line
    pub async fn boot(
        &self,
        avd_name: &str,
        mode: BootMode,
        timeout: Duration,
        collector: &mut BootTimeCollector,
    ) -> Result<RunResult, SupervisorError> {
        let command = self.launch_command(avd_name, &EmulatorOptions::for_mode(mode));
        info!("Launching emulator {} ({} boot)", avd_name, mode);
        self.supervisor.run(&command, timeout, collector).await
    }
}
