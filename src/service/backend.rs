use crate::bridge::{BridgeCommand, BridgeResult};
use crate::common::{FingerprintError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};

/// Something that can run a bridge command on the service's behalf.
///
/// `Err` is reserved for faults of the bridge itself (spawn failure,
/// timeout, unreadable output). Operation failures such as a duplicate
/// enrollment come back as `Ok` with `success: false`.
#[async_trait]
pub trait BridgeBackend: Send + Sync {
    async fn execute(&self, command: &BridgeCommand) -> Result<BridgeResult>;
}

/// Spawns one helper process per command.
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    helper: PathBuf,
    config_path: Option<PathBuf>,
    dev: bool,
    timeout: Duration,
}

impl ProcessBridge {
    pub fn new(helper: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { helper: helper.into(), config_path: None, dev: false, timeout }
    }

    /// Forwards `--config` to every helper invocation.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    fn command(&self, command: &BridgeCommand) -> Command {
        let mut cmd = Command::new(&self.helper);
        if let Some(path) = &self.config_path {
            cmd.arg("--config").arg(path);
        }
        if self.dev {
            cmd.arg("--dev");
        }
        cmd.args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl BridgeBackend for ProcessBridge {
    async fn execute(&self, command: &BridgeCommand) -> Result<BridgeResult> {
        tracing::info!("Executing: {} {}", self.helper.display(), command.args().join(" "));

        let mut child = self.command(command).spawn().map_err(|e| {
            FingerprintError::BridgeUnavailable(format!("{}: {}", self.helper.display(), e))
        })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_stderr(stderr));
        }

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::error!("Helper did not finish {} within {:?}", command.name(), self.timeout);
                FingerprintError::BridgeTimeout(self.timeout.as_secs())
            })?
            .map_err(pipe_error)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match BridgeResult::parse_output(&stdout) {
            Ok(result) => {
                tracing::debug!("Helper exited with {} for {}", output.status, command.name());
                Ok(result)
            }
            Err(e) => {
                tracing::error!("Helper exited with {} and no usable result", output.status);
                Err(e)
            }
        }
    }
}

/// Failures reading the helper's pipes belong to the bridge, not to storage.
fn pipe_error(e: std::io::Error) -> FingerprintError {
    FingerprintError::BridgeProtocol(format!("Failed to read helper output: {}", e))
}

async fn relay_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            tracing::info!("[helper] {}", line.trim_end());
        }
    }
}
