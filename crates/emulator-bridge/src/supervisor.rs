//! Process Supervisor
//!
//! Runs one external tool at a time, feeds every line it prints to a
//! classifier and always reaps the child before returning.

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use checkboottimes_core::BenchError;

/// Lines buffered between the reader tasks and the classifier
const DEFAULT_LINE_BUFFER: usize = 256;

/// Supervisor errors
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to stop process {pid}: {source}")]
    Stop {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

impl From<SupervisorError> for BenchError {
    fn from(err: SupervisorError) -> Self {
        BenchError::Process(err.to_string())
    }
}

/// Classifier verdict for one line of output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep waiting
    Continue,
    /// The run reached its goal
    Complete,
    /// The run failed
    Error,
}

/// Outcome of one supervised run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Completed,
    ClassifierError,
    TimedOut,
}

impl RunResult {
    pub fn is_completed(self) -> bool {
        self == RunResult::Completed
    }
}

/// Decides, line by line, when a supervised run is done.
///
/// Lines from stdout and stderr arrive as one sequence; order is kept
/// within a stream only. `None` marks the end of a stream and is delivered
/// once per stream. Calls are never concurrent, so implementations may keep
/// plain mutable state (collected samples, error counters).
pub trait LineClassifier: Send {
    fn classify(&mut self, line: Option<&str>) -> Decision;
}

impl<F> LineClassifier for F
where
    F: FnMut(Option<&str>) -> Decision + Send,
{
    fn classify(&mut self, line: Option<&str>) -> Decision {
        self(line)
    }
}

/// Program and arguments of a supervised run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Pass arguments to the program unescaped (Windows `cmd /C` scripts)
    pub verbatim: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            verbatim: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run `script` through the platform shell (`bash -c` / `cmd /S /C`)
    pub fn shell(script: impl Into<String>) -> Self {
        if cfg!(windows) {
            // With /S cmd strips exactly the outer pair of quotes.
            let script = format!("\"{}\"", script.into());
            Self {
                verbatim: true,
                ..Self::new("cmd").args(["/S", "/C"]).arg(script)
            }
        } else {
            Self::new("bash").arg("-c").arg(script)
        }
    }

    fn to_command(&self) -> Command {
        let mut command = std::process::Command::new(&self.program);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            if self.verbatim {
                // cmd does not understand the `\"` escaping applied by `arg`.
                for arg in &self.args {
                    command.raw_arg(arg);
                }
                return Command::from(command);
            }
        }
        command.args(&self.args);
        Command::from(command)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct OutputLine {
    stream: Stream,
    text: Option<String>,
}

/// Spawns a child, classifies its output and stops it on every exit path
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    line_buffer: usize,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            line_buffer: DEFAULT_LINE_BUFFER,
        }
    }

    /// Run `command` until `classifier` signals or `timeout` elapses.
    ///
    /// On timeout the child gets `timeout` once more to exit on its own
    /// before it is killed. On a classifier signal a still-running child is
    /// killed right away. In every case the child has been reaped and both
    /// reader tasks joined when this returns.
    pub async fn run<C>(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        classifier: &mut C,
    ) -> Result<RunResult, SupervisorError>
    where
        C: LineClassifier + ?Sized,
    {
        let mut child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: command.program.display().to_string(),
                source,
            })?;
        let pid = child.id().unwrap_or_default();
        debug!(pid, ?timeout, "Started {}", command);

        let (tx, mut rx) = mpsc::channel(self.line_buffer);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Stream::Stderr, tx.clone()));
        }
        drop(tx);

        let result = classify_until(&mut rx, Instant::now() + timeout, classifier).await;
        debug!(pid, ?result, "Finished {}", command);

        let stopped = stop_child(&mut child, &mut rx, pid, result, timeout).await;

        // Grandchildren can keep the pipes open after the child is gone.
        drop(rx);
        for reader in readers {
            reader.abort();
            let _ = reader.await;
        }

        stopped.map(|()| result)
    }
}

async fn classify_until<C>(
    rx: &mut mpsc::Receiver<OutputLine>,
    deadline: Instant,
    classifier: &mut C,
) -> RunResult
where
    C: LineClassifier + ?Sized,
{
    let expired = tokio::time::sleep_until(deadline);
    tokio::pin!(expired);

    loop {
        tokio::select! {
            biased;
            _ = &mut expired => return RunResult::TimedOut,
            received = rx.recv() => {
                let Some(line) = received else {
                    // Both streams closed without a verdict.
                    (&mut expired).await;
                    return RunResult::TimedOut;
                };

                trace!(stream = ?line.stream, text = ?line.text, "output");
                match classifier.classify(line.text.as_deref()) {
                    Decision::Continue => {}
                    Decision::Complete => return RunResult::Completed,
                    Decision::Error => return RunResult::ClassifierError,
                }
            }
        }
    }
}

async fn stop_child(
    child: &mut Child,
    rx: &mut mpsc::Receiver<OutputLine>,
    pid: u32,
    result: RunResult,
    grace: Duration,
) -> Result<(), SupervisorError> {
    if result == RunResult::TimedOut {
        match tokio::time::timeout(grace, wait_draining(child, rx)).await {
            Ok(Ok(status)) => {
                debug!(pid, %status, "Process exited after timeout");
                return Ok(());
            }
            Ok(Err(e)) => warn!(pid, error = %e, "Failed waiting for process"),
            Err(_) => warn!(pid, "Process still running {:?} after timeout, killing", grace),
        }
    }

    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(pid, %status, "Process already exited");
            return Ok(());
        }
        Ok(None) => {}
        Err(e) => warn!(pid, error = %e, "Failed to query process status"),
    }

    if let Err(source) = child.kill().await {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }
        return Err(SupervisorError::Stop { pid, source });
    }

    debug!(pid, "Process killed");
    Ok(())
}

/// Wait for the child while discarding its output, so a full pipe cannot
/// keep it from exiting.
async fn wait_draining(
    child: &mut Child,
    rx: &mut mpsc::Receiver<OutputLine>,
) -> std::io::Result<ExitStatus> {
    let mut open = true;
    loop {
        tokio::select! {
            status = child.wait() => return status,
            received = rx.recv(), if open => {
                if received.is_none() {
                    open = false;
                }
            }
        }
    }
}

fn spawn_reader<R>(stream: R, source: Stream, tx: mpsc::Sender<OutputLine>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
                    let line = OutputLine {
                        stream: source,
                        text: Some(text),
                    };
                    if tx.send(line).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    debug!(stream = ?source, error = %e, "Output stream read failed");
                    break;
                }
            }
        }

        let _ = tx
            .send(OutputLine {
                stream: source,
                text: None,
            })
            .await;
    })
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    fn is_alive(pid: u32) -> bool {
        std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -0 {} 2>/dev/null", pid))
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Completes on `marker`, remembering the pid echoed as the first line
    fn pid_then<'a>(marker: &'static str, verdict: Decision, pid: &'a mut Option<u32>) -> impl FnMut(Option<&str>) -> Decision + Send + 'a {
        move |line: Option<&str>| {
            let Some(line) = line else {
                return Decision::Continue;
            };
            if pid.is_none() {
                *pid = line.trim().parse().ok();
            }
            if line == marker {
                verdict
            } else {
                Decision::Continue
            }
        }
    }

    #[tokio::test]
    async fn test_returns_as_soon_as_line_completes() {
        let supervisor = ProcessSupervisor::new();
        let started = StdInstant::now();
        let mut classifier = |line: Option<&str>| {
            if line == Some("ready") {
                Decision::Complete
            } else {
                Decision::Continue
            }
        };

        let result = supervisor
            .run(&sh("echo starting; echo ready; sleep 30"), Duration::from_secs(20), &mut classifier)
            .await
            .unwrap();

        assert_eq!(result, RunResult::Completed);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_silent_process_times_out_not_earlier() {
        let supervisor = ProcessSupervisor::new();
        let timeout = Duration::from_millis(300);
        let started = StdInstant::now();
        let mut classifier = |_: Option<&str>| Decision::Continue;

        let result = supervisor.run(&sh("sleep 30"), timeout, &mut classifier).await.unwrap();

        assert_eq!(result, RunResult::TimedOut);
        assert!(started.elapsed() >= timeout);
    }

    #[tokio::test]
    async fn test_exited_process_waits_for_timeout() {
        let supervisor = ProcessSupervisor::new();
        let timeout = Duration::from_millis(400);
        let mut seen: Vec<Option<String>> = Vec::new();
        let started = StdInstant::now();
        let mut classifier = |line: Option<&str>| {
            seen.push(line.map(str::to_string));
            Decision::Continue
        };

        let result = supervisor.run(&sh("echo hello"), timeout, &mut classifier).await.unwrap();

        assert_eq!(result, RunResult::TimedOut);
        assert!(started.elapsed() >= timeout);
        assert!(seen.contains(&Some("hello".to_string())));
        assert_eq!(seen.iter().filter(|line| line.is_none()).count(), 2);
    }

    #[tokio::test]
    async fn test_stderr_lines_are_classified() {
        let supervisor = ProcessSupervisor::new();
        let mut classifier = |line: Option<&str>| {
            if line == Some("marker") {
                Decision::Complete
            } else {
                Decision::Continue
            }
        };

        let result = supervisor
            .run(&sh("echo marker >&2; sleep 30"), Duration::from_secs(20), &mut classifier)
            .await
            .unwrap();

        assert_eq!(result, RunResult::Completed);
    }

    #[tokio::test]
    async fn test_lines_after_signal_are_ignored() {
        let supervisor = ProcessSupervisor::new();
        let mut calls = 0;
        let mut classifier = |line: Option<&str>| {
            calls += 1;
            if line == Some("done") {
                Decision::Complete
            } else {
                Decision::Continue
            }
        };

        let result = supervisor
            .run(&sh("echo a; echo done; echo b; echo c; sleep 30"), Duration::from_secs(20), &mut classifier)
            .await
            .unwrap();

        assert_eq!(result, RunResult::Completed);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_crlf_is_trimmed() {
        let supervisor = ProcessSupervisor::new();
        let mut classifier = |line: Option<&str>| {
            if line == Some("ready") {
                Decision::Complete
            } else {
                Decision::Continue
            }
        };

        let result = supervisor
            .run(&sh("printf 'ready\\r\\n'; sleep 30"), Duration::from_secs(20), &mut classifier)
            .await
            .unwrap();

        assert_eq!(result, RunResult::Completed);
    }

    #[tokio::test]
    async fn test_completed_child_is_reaped() {
        let supervisor = ProcessSupervisor::new();
        let mut pid = None;
        let result = {
            let mut classifier = pid_then("up", Decision::Complete, &mut pid);
            supervisor
                .run(&sh("echo $$; echo up; sleep 30"), Duration::from_secs(20), &mut classifier)
                .await
                .unwrap()
        };

        assert_eq!(result, RunResult::Completed);
        let pid = pid.expect("pid line");
        assert!(!is_alive(pid));
    }

    #[tokio::test]
    async fn test_classifier_error_stops_child() {
        let supervisor = ProcessSupervisor::new();
        let mut pid = None;
        let result = {
            let mut classifier = pid_then("fatal", Decision::Error, &mut pid);
            supervisor
                .run(&sh("echo $$; echo fatal; sleep 30"), Duration::from_secs(20), &mut classifier)
                .await
                .unwrap()
        };

        assert_eq!(result, RunResult::ClassifierError);
        let pid = pid.expect("pid line");
        assert!(!is_alive(pid));
    }

    #[tokio::test]
    async fn test_timed_out_child_is_killed() {
        let supervisor = ProcessSupervisor::new();
        let mut pid = None;
        let result = {
            let mut classifier = pid_then("never", Decision::Complete, &mut pid);
            supervisor
                .run(&sh("echo $$; sleep 30"), Duration::from_millis(200), &mut classifier)
                .await
                .unwrap()
        };

        assert_eq!(result, RunResult::TimedOut);
        let pid = pid.expect("pid line");
        assert!(!is_alive(pid));
    }

    #[tokio::test]
    async fn test_noisy_child_exits_during_grace_wait() {
        let supervisor = ProcessSupervisor::new();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("exited");
        let timeout = Duration::from_secs(1);
        let started = StdInstant::now();
        let mut classifier = |_: Option<&str>| Decision::Continue;

        let script = format!("sleep 1.2; yes line | head -c 200000; touch '{}'", marker.display());
        let result = supervisor.run(&sh(&script), timeout, &mut classifier).await.unwrap();

        assert_eq!(result, RunResult::TimedOut);
        assert!(marker.exists(), "child was killed instead of exiting on its own");
        assert!(started.elapsed() < timeout * 2);
    }

    #[tokio::test]
    async fn test_zero_timeout_stops_child() {
        let supervisor = ProcessSupervisor::new();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survived");
        let mut classifier = |_: Option<&str>| Decision::Continue;

        let script = format!("sleep 1; touch '{}'", marker.display());
        let result = supervisor.run(&sh(&script), Duration::ZERO, &mut classifier).await.unwrap();

        assert_eq!(result, RunResult::TimedOut);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn test_shell_wrapper() {
        let command = CommandSpec::shell("echo no | avdmanager");
        assert!(command.args.last().unwrap().contains("echo no | avdmanager"));
        assert_eq!(command.verbatim, cfg!(windows));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let supervisor = ProcessSupervisor::new();
        let mut classifier = |_: Option<&str>| Decision::Continue;

        let err = supervisor
            .run(&CommandSpec::new("/nonexistent/checkboottimes-tool"), Duration::from_millis(100), &mut classifier)
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::Spawn { .. }));
    }

    #[test]
    fn test_command_display() {
        let command = CommandSpec::new("/sdk/emulator/emulator").args(["-avd", "XamarinPerfTest"]);
        assert_eq!(command.to_string(), "/sdk/emulator/emulator -avd XamarinPerfTest");
    }
}
