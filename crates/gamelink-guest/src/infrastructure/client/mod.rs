//! Subprocess adapter for the external streaming client.
//!
//! # Sub-modules
//!
//! - **`pairing`** – Drives `pair <host>`: merges the output streams, spots
//!   the PIN and success phrases, honours cancellation, always reaps.
//!
//! - **`session`** – Wraps a running `stream` process and keeps a tail of
//!   its output.
//!
//! [`CliStreamClient`] ties them together behind the application layer's
//! [`StreamClient`] trait.

pub mod pairing;
pub mod session;

use std::process::Stdio;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gamelink_core::{HostAddress, StreamParams};
use tokio::process::Command;
use tracing::{debug, info};

use crate::application::stream_client::{
    ClientError, PairingReport, PinCallback, RunningStream, StreamClient,
};
use crate::infrastructure::process::{
    combined_output, isolate_process_group, run_with_timeout, ProcessError,
};
use pairing::PairingSession;
use session::{CliStream, OutputTail};

/// How long the output readers may keep draining after an early exit.
const EARLY_EXIT_DRAIN: Duration = Duration::from_millis(500);

/// Program plus fixed leading arguments, e.g. `flatpak run <app-id>`.
#[derive(Debug, Clone)]
pub struct ClientCommand {
    program: String,
    leading_args: Vec<String>,
}

impl ClientCommand {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `program [leading args] <subcommand> <host>`.
    pub fn build(&self, subcommand: &str, host: &HostAddress) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg(subcommand)
            .arg(host.to_uri_host());
        cmd
    }
}

/// Timeouts of the CLI adapter.
#[derive(Debug, Clone, Copy)]
pub struct CliTimeouts {
    /// Upper bound on `list`.
    pub capability_probe: Duration,
    /// A `stream` that exits within this window failed to launch.
    pub launch_grace: Duration,
    /// Cancellation poll interval of `pair`.
    pub pairing_poll: Duration,
}

impl Default for CliTimeouts {
    fn default() -> Self {
        Self {
            capability_probe: Duration::from_secs(15),
            launch_grace: Duration::from_secs(3),
            pairing_poll: pairing::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// [`StreamClient`] that runs the client binary.
#[derive(Debug, Clone)]
pub struct CliStreamClient {
    command: ClientCommand,
    timeouts: CliTimeouts,
    pairing: PairingSession,
}

impl CliStreamClient {
    pub fn new(command: ClientCommand, timeouts: CliTimeouts) -> Self {
        let pairing =
            PairingSession::new(command.clone()).with_poll_interval(timeouts.pairing_poll);
        Self {
            command,
            timeouts,
            pairing,
        }
    }

    fn map_process_error(&self, operation: &'static str, err: ProcessError) -> ClientError {
        match err {
            ProcessError::Spawn { source, .. } => ClientError::Spawn {
                program: self.command.program().to_string(),
                source,
            },
            ProcessError::TimedOut { after, .. } => ClientError::TimedOut { operation, after },
            ProcessError::Wait { source, .. } => ClientError::Io(source),
        }
    }
}

#[async_trait]
impl StreamClient for CliStreamClient {
    async fn list_apps(&self, host: &HostAddress) -> Result<Vec<String>, ClientError> {
        let cmd = self.command.build("list", host);
        let output = run_with_timeout(cmd, self.timeouts.capability_probe)
            .await
            .map_err(|e| self.map_process_error("list", e))?;

        if !output.status.success() {
            return Err(ClientError::Rejected {
                code: output.status.code(),
                output: combined_output(&output),
            });
        }
        let apps: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        debug!(%host, ?apps, "Capability probe succeeded");
        Ok(apps)
    }

    async fn pair(
        &self,
        host: &HostAddress,
        on_pin: PinCallback,
        cancel: Arc<AtomicBool>,
    ) -> Result<PairingReport, ClientError> {
        self.pairing.run(host, on_pin, cancel).await
    }

    async fn launch(
        &self,
        host: &HostAddress,
        params: &StreamParams,
    ) -> Result<Box<dyn RunningStream>, ClientError> {
        let mut cmd = self.command.build("stream", host);
        cmd.arg(&params.app)
            .args(params.to_cli_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut cmd);
        let mut child = cmd.spawn().map_err(|source| ClientError::Spawn {
            program: self.command.program().to_string(),
            source,
        })?;
        info!(%host, app = %params.app, pid = ?child.id(), "Stream client started");

        let tail = OutputTail::default();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tail.spawn_reader(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tail.spawn_reader(stderr));
        }

        match tokio::time::timeout(self.timeouts.launch_grace, child.wait()).await {
            Err(_) => Ok(Box::new(CliStream::new(child, tail))),
            Ok(Err(e)) => Err(ClientError::Io(e)),
            Ok(Ok(status)) => {
                for reader in readers {
                    let _ = tokio::time::timeout(EARLY_EXIT_DRAIN, reader).await;
                }
                Err(ClientError::ExitedEarly {
                    code: status.code(),
                    output: tail.text(),
                })
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn scripted(body: &str, timeouts: CliTimeouts) -> (CliStreamClient, PathBuf) {
        let path = std::env::temp_dir().join(format!("gamelink-cli-{}.sh", Uuid::new_v4()));
        std::fs::write(&path, body).unwrap();
        let command = ClientCommand::new("sh", vec![path.to_string_lossy().into_owned()]);
        (CliStreamClient::new(command, timeouts), path)
    }

    fn quick() -> CliTimeouts {
        CliTimeouts {
            capability_probe: Duration::from_secs(5),
            launch_grace: Duration::from_millis(300),
            pairing_poll: Duration::from_millis(50),
        }
    }

    fn host() -> HostAddress {
        HostAddress::V4(Ipv4Addr::new(10, 0, 0, 2))
    }

    #[tokio::test]
    async fn test_list_returns_app_names_on_success() {
        let (client, path) = scripted("printf 'Desktop\\nSteam\\n\\n'\n", quick());

        let apps = client.list_apps(&host()).await;
        let _ = std::fs::remove_file(&path);

        assert_eq!(apps.unwrap(), vec!["Desktop".to_string(), "Steam".to_string()]);
    }

    #[tokio::test]
    async fn test_list_failure_is_rejected_with_output() {
        let (client, path) = scripted("echo 'The client is not paired' >&2\nexit 1\n", quick());

        let result = client.list_apps(&host()).await;
        let _ = std::fs::remove_file(&path);

        match result {
            Err(ClientError::Rejected { code, output }) => {
                assert_eq!(code, Some(1));
                assert!(output.contains("not paired"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_times_out() {
        let timeouts = CliTimeouts {
            capability_probe: Duration::from_millis(100),
            ..quick()
        };
        let (client, path) = scripted("exec sleep 5\n", timeouts);

        let result = client.list_apps(&host()).await;
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            result,
            Err(ClientError::TimedOut {
                operation: "list",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_launch_exit_within_grace_window_fails() {
        let (client, path) = scripted("echo 'Failed to connect to host' >&2\nexit 2\n", quick());

        let result = client.launch(&host(), &StreamParams::default()).await;
        let _ = std::fs::remove_file(&path);

        match result {
            Err(ClientError::ExitedEarly { code, output }) => {
                assert_eq!(code, Some(2));
                assert!(output.contains("Failed to connect"));
            }
            Err(other) => panic!("expected ExitedEarly, got {other:?}"),
            Ok(_) => panic!("expected ExitedEarly, got a running stream"),
        }
    }

    #[tokio::test]
    async fn test_launch_passes_app_and_stream_flags() {
        // Arrange: the fake client records its arguments, then keeps running.
        let args_file = std::env::temp_dir().join(format!("gamelink-args-{}", Uuid::new_v4()));
        let body = format!("echo \"$@\" > '{}'\nexec sleep 30\n", args_file.display());
        let (client, path) = scripted(&body, quick());

        // Act
        let mut stream = client
            .launch(&host(), &StreamParams::default())
            .await
            .unwrap();
        let recorded = std::fs::read_to_string(&args_file).unwrap();
        stream.terminate().await;
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&args_file);

        // Assert
        assert!(
            recorded.starts_with("stream 10.0.0.2 Desktop --resolution 1920x1080 --fps 60"),
            "recorded: {recorded}"
        );
        assert!(recorded.contains("--video-decoder auto"));
    }

    #[tokio::test]
    async fn test_running_stream_reports_exit_code() {
        let timeouts = CliTimeouts {
            launch_grace: Duration::from_millis(100),
            ..quick()
        };
        let (client, path) = scripted("sleep 0.5\nexit 7\n", timeouts);

        let mut stream = client
            .launch(&host(), &StreamParams::default())
            .await
            .unwrap();
        let code = stream.wait().await.unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(code, Some(7));
    }
}
