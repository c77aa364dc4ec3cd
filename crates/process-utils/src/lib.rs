//! Helpers for running external executables from the workspace.
//!
//! Child processes never open a console window on Windows, and
//! [`run_captured`] collects their output with an optional upper bound on
//! how long the child may run.

use std::ffi::OsStr;
use std::process::ExitStatus;
use std::time::Duration;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Suppress the console window Windows would otherwise attach to a child.
///
/// No-op everywhere else.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Build a `tokio::process::Command` that is killed when its handle is dropped.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}

/// Output of a child process that ran to completion.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Short human-readable reason for a failed run.
    ///
    /// Prefers the last non-empty stderr line, falling back to the exit code.
    pub fn failure_reason(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match self.status.code() {
                Some(code) => format!("exited with code {code}"),
                None => "terminated by signal".to_string(),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("process timed out after {0:?}")]
    TimedOut(Duration),
}

/// Run `command` to completion, capturing stdout and stderr.
///
/// When `timeout` elapses first the child is killed and
/// [`RunError::TimedOut`] is returned.
#[cfg(feature = "tokio")]
pub async fn run_captured(
    command: &mut tokio::process::Command,
    timeout: Option<Duration>,
) -> Result<CapturedOutput, RunError> {
    use std::process::Stdio;
    use std::time::Instant;

    let start = Instant::now();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(RunError::Spawn)?;
    let wait = child.wait_with_output();

    // Dropping the pending future drops the child, which kills it.
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| RunError::TimedOut(limit))?,
        None => wait.await,
    }
    .map_err(RunError::Wait)?;

    Ok(CapturedOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        elapsed: start.elapsed(),
    })
}
