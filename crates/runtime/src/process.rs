//! Driver process lifecycle.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::driver::DriverConfig;
use crate::error::{Error, Result};

/// Grace period between a `quit` acknowledgement and a forced kill.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// A spawned driver subprocess.
///
/// Stdin and stdout are handed to the connection at spawn time; the process
/// handle is kept for shutdown. The child is killed on drop if it is still
/// running.
#[derive(Debug)]
pub struct DriverProcess {
    child: Child,
}

impl DriverProcess {
    /// Spawn the driver with piped stdin/stdout (stderr inherited).
    ///
    /// Waits briefly and checks for immediate exit so a bad command line
    /// surfaces as [`Error::LaunchFailed`] instead of a broken pipe later.
    pub async fn spawn(config: &DriverConfig) -> Result<(Self, ChildStdin, ChildStdout)> {
        debug!(program = config.program(), "spawning driver");

        let mut child = Command::new(config.program())
            .args(config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::LaunchFailed(format!("failed to spawn process: {e}")))?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(Error::LaunchFailed(format!(
                    "driver exited immediately with status: {status}"
                )));
            }
            Ok(None) => {}
            Err(e) => {
                return Err(Error::LaunchFailed(format!(
                    "failed to check process status: {e}"
                )));
            }
        }

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::LaunchFailed("driver stdin not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::LaunchFailed("driver stdout not piped".into()))?;

        Ok((Self { child }, stdin, stdout))
    }

    /// Wait for the process to exit after `quit`, killing it if it lingers.
    pub async fn shutdown(mut self) -> Result<()> {
        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%status, "driver exited");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::LaunchFailed(format!(
                "failed to wait for driver: {e}"
            ))),
            Err(_) => {
                debug!("driver did not exit in time, killing");
                self.kill().await
            }
        }
    }

    /// Force kill the process.
    pub async fn kill(mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| Error::LaunchFailed(format!("failed to kill driver: {e}")))?;
        let _ = tokio::time::timeout(Duration::from_millis(500), self.child.wait()).await;
        Ok(())
    }
}
