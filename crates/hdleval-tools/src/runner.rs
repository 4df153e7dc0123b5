//! Subprocess execution with timeouts.
//!
//! Every external tool call goes through [`run_tool`], which never fails:
//! a missing executable, a timeout or a spawn error each come back as a
//! [`ToolOutcome`] variant.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

/// A single tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Captured output of a tool that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Finished(ToolOutput),
    NotFound { program: String },
    TimedOut { program: String, timeout: Duration },
    SpawnFailed { program: String, message: String },
}

impl ToolOutcome {
    /// The output, when the tool ran to completion.
    pub fn output(&self) -> Option<&ToolOutput> {
        match self {
            ToolOutcome::Finished(output) => Some(output),
            _ => None,
        }
    }

    /// One line describing why the tool did not finish.
    pub fn describe(&self) -> String {
        match self {
            ToolOutcome::Finished(output) => match output.exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_string(),
            },
            ToolOutcome::NotFound { program } => format!("{program} not found in PATH"),
            ToolOutcome::TimedOut { program, timeout } => {
                format!("{program} timed out after {}s", timeout.as_secs())
            }
            ToolOutcome::SpawnFailed { program, message } => {
                format!("failed to run {program}: {message}")
            }
        }
    }
}

/// Run `command`, killing it when the timeout elapses.
pub async fn run_tool(command: &ToolCommand) -> ToolOutcome {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &command.cwd {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ToolOutcome::NotFound {
                program: command.program.clone(),
            }
        }
        Err(e) => {
            return ToolOutcome::SpawnFailed {
                program: command.program.clone(),
                message: e.to_string(),
            }
        }
    };

    // Dropping the wait future on timeout drops the child, which kills it.
    match tokio::time::timeout(command.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            debug!(
                program = %command.program,
                status = ?output.status.code(),
                duration_ms,
                "tool finished"
            );
            ToolOutcome::Finished(ToolOutput {
                exit_code: output.status.code(),
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration_ms,
            })
        }
        Ok(Err(e)) => ToolOutcome::SpawnFailed {
            program: command.program.clone(),
            message: e.to_string(),
        },
        Err(_) => {
            debug!(program = %command.program, timeout = ?command.timeout, "tool timed out");
            ToolOutcome::TimedOut {
                program: command.program.clone(),
                timeout: command.timeout,
            }
        }
    }
}

/// Locate `program` on `PATH`.
pub fn which(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

pub fn is_tool_available(program: &str) -> bool {
    which(program).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_simple_command() {
        let cmd = ToolCommand::new("echo", Duration::from_secs(10)).arg("hello");
        let outcome = run_tool(&cmd).await;
        let output = outcome.output().expect("echo should finish");
        assert!(output.success);
        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_failing_command_is_finished_not_error() {
        let outcome = run_tool(&ToolCommand::new("false", Duration::from_secs(10))).await;
        let output = outcome.output().expect("false should finish");
        assert!(!output.success);
        assert_ne!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let cmd = ToolCommand::new("hdleval-no-such-tool", Duration::from_secs(1));
        let outcome = run_tool(&cmd).await;
        assert_eq!(
            outcome,
            ToolOutcome::NotFound {
                program: "hdleval-no-such-tool".to_string()
            }
        );
        assert_eq!(outcome.describe(), "hdleval-no-such-tool not found in PATH");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let cmd = ToolCommand::new("sleep", Duration::from_millis(100)).arg("5");
        let start = Instant::now();
        let outcome = run_tool(&cmd).await;
        assert!(matches!(outcome, ToolOutcome::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(outcome.describe(), "sleep timed out after 0s");
    }

    #[tokio::test]
    async fn test_current_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ToolCommand::new("pwd", Duration::from_secs(10)).current_dir(dir.path());
        let outcome = run_tool(&cmd).await;
        let output = outcome.output().unwrap();
        let reported = PathBuf::from(output.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_which() {
        assert!(which("sh").is_some());
        assert!(which("hdleval-no-such-tool").is_none());
        assert!(!is_tool_available("hdleval-no-such-tool"));
    }
}
