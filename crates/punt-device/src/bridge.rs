use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Default upper bound for a single device query
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Failure of an external device query
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },
}

/// Queries answered by the device on the other end of the log stream.
///
/// Callers treat every error as "process not currently running".
pub trait DeviceBridge {
    /// Process ids currently running for `package` (empty if none)
    fn pidof(&self, package: &str) -> impl Future<Output = Result<Vec<String>, BridgeError>>;

    /// Raw contents of `/proc/<pid>/status`
    fn proc_status(&self, pid: &str) -> impl Future<Output = Result<String, BridgeError>>;
}

/// `adb shell` backed bridge
#[derive(Clone, Debug)]
pub struct AdbBridge {
    program: String,
    serial: Option<String>,
    timeout: Duration,
}

impl AdbBridge {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            serial: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Target a specific device (`adb -s <serial>`)
    pub fn with_serial(mut self, serial: Option<String>) -> Self {
        self.serial = serial;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `adb [-s serial] shell <args..>` and return its stdout
    async fn shell(&self, args: &[&str]) -> Result<String, BridgeError> {
        let command = format!("{} shell {}", self.program, args.join(" "));

        let mut cmd = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.arg("shell")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| BridgeError::Timeout {
                command: command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| BridgeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BridgeError::Failed {
                command,
                status: output.status.to_string(),
            });
        }

        debug!(%command, bytes = output.stdout.len(), "device query finished");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DeviceBridge for AdbBridge {
    async fn pidof(&self, package: &str) -> Result<Vec<String>, BridgeError> {
        let stdout = self.shell(&["pidof", package]).await?;
        Ok(split_pids(&stdout))
    }

    async fn proc_status(&self, pid: &str) -> Result<String, BridgeError> {
        let path = format!("/proc/{}/status", pid);
        self.shell(&["cat", &path]).await
    }
}

/// `pidof` prints every matching pid on one line separated by spaces
fn split_pids(stdout: &str) -> Vec<String> {
    stdout.split_whitespace().map(str::to_string).collect()
}
