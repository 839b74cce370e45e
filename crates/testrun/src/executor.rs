//! Command execution with a bounded wait time.
//!
//! Each invocation appends to a per-item log file:
//! - a banner naming the command line,
//! - the combined stdout/stderr of the process,
//! - a banner with the outcome.
//!
//! Every way a command can end (exit code, timeout, launch failure) is
//! folded into a single [`OutcomeCode`]; nothing is raised to the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use testrun_core::{CommandItem, OutcomeCode, TestInfo};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const BANNER_TOP: &str = "=======================================";
const BANNER_BOTTOM: &str = "======================================";

/// Conventional shell exit code for a program that could not be found.
const NOT_FOUND_CODE: OutcomeCode = OutcomeCode(127);
/// Conventional shell exit code for a program that could not be executed.
const NOT_EXECUTABLE_CODE: OutcomeCode = OutcomeCode(126);

/// Program plus argument vector. Never reinterpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
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

    /// Build the command for a plan item: program location plus resolved parameters.
    pub fn for_item(info: &dyn TestInfo, item: &CommandItem, module_path: &Path) -> Self {
        Self::new(item.program(module_path)).args(info.parameters(item))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How the process wait terminated.
#[derive(Debug)]
enum ProcessOutcome {
    Completed(ExitStatus),
    TimedOut,
    LaunchFailed(std::io::Error),
    /// Spawned, but waiting on the child failed; the child is killed on drop.
    WaitFailed(std::io::Error),
}

impl ProcessOutcome {
    fn code(&self) -> OutcomeCode {
        match self {
            Self::Completed(status) => exit_status_code(*status),
            Self::TimedOut => OutcomeCode::TIMEOUT,
            Self::LaunchFailed(err) => match err.kind() {
                std::io::ErrorKind::NotFound => NOT_FOUND_CODE,
                std::io::ErrorKind::PermissionDenied => NOT_EXECUTABLE_CODE,
                _ => OutcomeCode(1),
            },
            Self::WaitFailed(_) => OutcomeCode(1),
        }
    }

    fn banner_text(&self) -> String {
        match self {
            Self::TimedOut => "Command time out".to_string(),
            Self::LaunchFailed(err) => format!("Command failed to launch: {err}"),
            Self::WaitFailed(err) => format!("Command wait failed: {err}"),
            Self::Completed(_) => {
                let code = self.code();
                if code.is_success() {
                    format!("Command returned: {code}")
                } else {
                    format!("Command failed: {code}")
                }
            }
        }
    }
}

/// Map an exit status to an outcome code.
///
/// Signal deaths report `128 + signal`. A status carrying neither an exit
/// code nor a signal is treated as success.
fn exit_status_code(status: ExitStatus) -> OutcomeCode {
    if let Some(code) = status.code() {
        return OutcomeCode::from_exit_code(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return OutcomeCode(128 + signal as u32);
        }
    }

    warn!(status = ?status, "unrecognized process outcome; treating as success");
    OutcomeCode::SUCCESS
}

fn banner(text: &str) -> String {
    format!("{BANNER_TOP}\n  {text}\n{BANNER_BOTTOM}\n")
}

/// Runs single commands, logging into the current log directory.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    log_dir: PathBuf,
    env: BTreeMap<String, String>,
}

impl CommandExecutor {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            env: BTreeMap::new(),
        }
    }

    /// Environment overlay for every launched command.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Same environment, different log directory.
    pub fn in_log_dir(&self, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            env: self.env.clone(),
        }
    }

    /// Run one command and wait at most `wait_time` for it.
    ///
    /// The log file is opened in append mode for the duration of the call
    /// only, and is closed on every exit path.
    pub async fn run(&self, command: &CommandSpec, log_name: &str, wait_time: Duration) -> OutcomeCode {
        let log_path = self.log_dir.join(log_name);
        info!(command = %command, log = %log_path.display(), "starting command");

        let mut log = match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(file) => file,
            Err(err) => {
                error!(log = %log_path.display(), error = %err, "failed to open command log");
                return ProcessOutcome::LaunchFailed(err).code();
            }
        };

        if let Err(err) = log.write_all(banner(&format!("Command: {command}")).as_bytes()) {
            warn!(log = %log_path.display(), error = %err, "failed to write command banner");
        }

        let outcome = self.spawn_and_wait(command, &log, wait_time).await;

        if let Err(err) = log.write_all(banner(&outcome.banner_text()).as_bytes()) {
            warn!(log = %log_path.display(), error = %err, "failed to write outcome banner");
        }
        if let Err(err) = log.flush() {
            warn!(log = %log_path.display(), error = %err, "failed to flush command log");
        }

        let code = outcome.code();
        match &outcome {
            ProcessOutcome::TimedOut => warn!(
                command = %command,
                wait_time_sec = wait_time.as_secs(),
                "command timed out"
            ),
            ProcessOutcome::LaunchFailed(err) => warn!(
                command = %command,
                error = %err,
                code = code.value(),
                "command failed to launch"
            ),
            ProcessOutcome::WaitFailed(err) => warn!(
                command = %command,
                error = %err,
                "failed to wait for command"
            ),
            ProcessOutcome::Completed(_) if !code.is_success() => {
                warn!(command = %command, code = code.value(), "command failed");
            }
            ProcessOutcome::Completed(_) => debug!(command = %command, "command passed"),
        }
        code
    }

    async fn spawn_and_wait(&self, command: &CommandSpec, log: &File, wait_time: Duration) -> ProcessOutcome {
        let (stdout, stderr) = match (log.try_clone(), log.try_clone()) {
            (Ok(stdout), Ok(stderr)) => (stdout, stderr),
            (Err(err), _) | (_, Err(err)) => return ProcessOutcome::LaunchFailed(err),
        };

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(err) => return ProcessOutcome::LaunchFailed(err),
        };

        match timeout(wait_time, child.wait()).await {
            Ok(Ok(status)) => ProcessOutcome::Completed(status),
            Ok(Err(err)) => ProcessOutcome::WaitFailed(err),
            Err(_) => {
                // Kill on timeout and reap to prevent a zombie.
                if let Err(err) = child.kill().await {
                    warn!(command = %command, error = %err, "failed to kill timed-out process");
                }
                ProcessOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    fn read_log(dir: &TempDir, name: &str) -> String {
        std::fs::read_to_string(dir.path().join(name)).unwrap()
    }

    #[test]
    fn command_spec_displays_full_command_line() {
        let spec = CommandSpec::new("/bin/echo").args(["hello", "world"]);
        assert_eq!(spec.to_string(), "/bin/echo hello world");
    }

    #[test]
    fn banner_matches_log_layout() {
        assert_eq!(
            banner("Command time out"),
            "=======================================\n  Command time out\n======================================\n"
        );
    }

    #[test]
    fn wait_failure_is_not_reported_as_launch_failure() {
        let outcome = ProcessOutcome::WaitFailed(std::io::Error::other("interrupted"));
        assert_eq!(outcome.code(), OutcomeCode(1));
        assert_eq!(outcome.banner_text(), "Command wait failed: interrupted");

        let launch = ProcessOutcome::LaunchFailed(std::io::Error::other("interrupted"));
        assert_ne!(launch.banner_text(), outcome.banner_text());
    }

    #[tokio::test]
    async fn successful_command_returns_zero() {
        let dir = TempDir::new().unwrap();
        let executor = CommandExecutor::new(dir.path());

        let code = executor
            .run(&sh("echo out; echo err >&2"), "ok.log", Duration::from_secs(10))
            .await;
        assert_eq!(code, OutcomeCode(0));

        let log = read_log(&dir, "ok.log");
        assert!(log.contains("Command: sh -c echo out; echo err >&2"));
        assert!(log.contains("out\n"));
        assert!(log.contains("err\n"));
        assert!(log.contains("Command returned: 0"));
    }

    #[tokio::test]
    async fn failing_command_returns_exit_code() {
        let dir = TempDir::new().unwrap();
        let executor = CommandExecutor::new(dir.path());

        let code = executor
            .run(&sh("exit 3"), "fail.log", Duration::from_secs(10))
            .await;
        assert_eq!(code, OutcomeCode(3));
        assert!(read_log(&dir, "fail.log").contains("Command failed: 3"));
    }

    #[tokio::test]
    async fn timed_out_command_returns_one() {
        let dir = TempDir::new().unwrap();
        let executor = CommandExecutor::new(dir.path());

        let code = executor
            .run(&sh("sleep 5; exit 7"), "slow.log", Duration::from_millis(300))
            .await;
        assert_eq!(code, OutcomeCode::TIMEOUT);
        assert!(read_log(&dir, "slow.log").contains("Command time out"));
    }

    #[tokio::test]
    async fn missing_program_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let executor = CommandExecutor::new(dir.path());

        let code = executor
            .run(
                &CommandSpec::new("/nonexistent/testrun-binary"),
                "missing.log",
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(code, NOT_FOUND_CODE);
        assert!(read_log(&dir, "missing.log").contains("Command failed to launch"));
    }

    #[tokio::test]
    async fn missing_log_directory_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let executor = CommandExecutor::new(dir.path().join("absent"));

        let code = executor
            .run(&CommandSpec::new("true"), "x.log", Duration::from_secs(5))
            .await;
        assert!(!code.is_success());
    }

    #[tokio::test]
    async fn log_file_is_appended_across_invocations() {
        let dir = TempDir::new().unwrap();
        let executor = CommandExecutor::new(dir.path());

        executor.run(&sh("echo first"), "shared.log", Duration::from_secs(10)).await;
        executor.run(&sh("echo second"), "shared.log", Duration::from_secs(10)).await;

        let log = read_log(&dir, "shared.log");
        let first = log.find("first").unwrap();
        let second = log.find("second").unwrap();
        assert!(first < second);
        assert_eq!(log.matches("Command returned: 0").count(), 2);
    }

    #[tokio::test]
    async fn stdin_is_closed() {
        let dir = TempDir::new().unwrap();
        let executor = CommandExecutor::new(dir.path());

        // `cat` exits immediately on an empty stdin instead of blocking.
        let code = executor
            .run(&CommandSpec::new("cat"), "cat.log", Duration::from_secs(5))
            .await;
        assert_eq!(code, OutcomeCode(0));
    }

    #[tokio::test]
    async fn environment_overlay_is_applied() {
        let dir = TempDir::new().unwrap();
        let env = BTreeMap::from([("TESTRUN_GREETING".to_string(), "hi there".to_string())]);
        let executor = CommandExecutor::new(dir.path()).with_env(env);

        executor
            .run(&sh("echo \"$TESTRUN_GREETING\""), "env.log", Duration::from_secs(5))
            .await;
        assert!(read_log(&dir, "env.log").contains("hi there"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_death_maps_to_shell_convention() {
        let dir = TempDir::new().unwrap();
        let executor = CommandExecutor::new(dir.path());

        let code = executor
            .run(&sh("kill -9 $$"), "signal.log", Duration::from_secs(5))
            .await;
        assert_eq!(code, OutcomeCode(128 + 9));
    }
}
