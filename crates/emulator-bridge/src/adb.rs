//! ADB (Android Debug Bridge) Client
//!
//! Starts activities on, and shuts down, the emulator under test.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::starts_with_ignore_case;
use crate::supervisor::{CommandSpec, Decision, ProcessSupervisor, RunResult, SupervisorError};

/// Reply of the emulator console to `emu kill`
pub const KILL_CONFIRMATION: &str = "OK: killing emulator, bye bye";

/// Substring of `am start` output once the intent was dispatched
pub const ACTIVITY_STARTED_MARKER: &str = "com.android";

/// Device selection for an adb invocation
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Emulator,
    Serial(String),
}

/// ADB command builder
#[derive(Debug, Clone)]
pub struct AdbCommand {
    target: Target,
    args: Vec<String>,
}

impl AdbCommand {
    /// Command for the only running emulator (`-e`)
    pub fn emulator() -> Self {
        Self {
            target: Target::Emulator,
            args: Vec::new(),
        }
    }

    /// Command for a specific serial (`-s`)
    pub fn device(serial: &str) -> Self {
        Self {
            target: Target::Serial(serial.to_string()),
            args: Vec::new(),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn shell(mut self, command: &[&str]) -> Self {
        self.args.push("shell".to_string());
        self.args.extend(command.iter().map(|s| s.to_string()));
        self
    }

    pub fn into_command(self, adb: impl Into<PathBuf>) -> CommandSpec {
        let spec = CommandSpec::new(adb);
        let spec = match self.target {
            Target::Emulator => spec.arg("-e"),
            Target::Serial(serial) => spec.arg("-s").arg(serial),
        };
        spec.args(self.args)
    }
}

/// ADB Client
#[derive(Debug, Clone)]
pub struct AdbClient {
    adb: PathBuf,
    supervisor: ProcessSupervisor,
}

impl AdbClient {
    /// Create a new ADB client
    pub fn new(adb: PathBuf, supervisor: ProcessSupervisor) -> Self {
        Self { adb, supervisor }
    }

    pub fn start_activity_command(&self, component: &str) -> CommandSpec {
        AdbCommand::emulator()
            .shell(&["am", "start", "-n", component])
            .into_command(&self.adb)
    }

    pub fn emu_kill_command(&self, serial: &str) -> CommandSpec {
        AdbCommand::device(serial)
            .args(&["emu", "kill"])
            .into_command(&self.adb)
    }

    /// Launch an activity on the running emulator
    pub async fn start_activity(
        &self,
        component: &str,
        timeout: Duration,
    ) -> Result<RunResult, SupervisorError> {
        debug!("Starting activity {}", component);
        let mut started = |line: Option<&str>| match line {
            Some(line) if line.contains(ACTIVITY_STARTED_MARKER) => Decision::Complete,
            _ => Decision::Continue,
        };

        self.supervisor
            .run(&self.start_activity_command(component), timeout, &mut started)
            .await
    }

    /// Ask the emulator console to shut the instance down
    pub async fn kill_emulator(
        &self,
        serial: &str,
        timeout: Duration,
    ) -> Result<RunResult, SupervisorError> {
        let mut confirmed = |line: Option<&str>| match line {
            Some(line) if starts_with_ignore_case(line, KILL_CONFIRMATION) => Decision::Complete,
            _ => Decision::Continue,
        };

        let result = self
            .supervisor
            .run(&self.emu_kill_command(serial), timeout, &mut confirmed)
            .await?;

        if !result.is_completed() {
            warn!("{} did not confirm the kill request ({:?})", serial, result);
        }
        Ok(result)
    }
}
