//! Port to the external streaming client.
//!
//! The guest never speaks the streaming protocol itself.  Everything that
//! touches the host's control service goes through a third-party client
//! binary with three subcommands:
//!
//! | Subcommand            | Used for                                         |
//! |-----------------------|--------------------------------------------------|
//! | `list <host>`         | Capability probe: exit 0 means we are paired     |
//! | `pair <host>`         | Interactive pairing; prints a PIN for the host   |
//! | `stream <host> <app>` | Long-running stream session                      |
//!
//! [`StreamClient`] abstracts those three calls so the connection state
//! machine can be tested with a recording double, while the infrastructure
//! layer provides the subprocess-backed implementation.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gamelink_core::{HostAddress, StreamParams};
use thiserror::Error;

/// Receives each PIN the client displays during pairing.
///
/// Contract: called at most once per distinct PIN, from a blocking-pool
/// thread, and never awaited by the pairing loop.  It may block (for
/// example to forward the PIN to the host) without stalling the transcript.
pub type PinCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Errors raised while driving the external client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client binary could not be started at all.
    #[error("failed to start streaming client `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The client ran but reported failure (non-zero exit).
    #[error("streaming client rejected the request (exit code {code:?}): {output}")]
    Rejected { code: Option<i32>, output: String },

    /// The client did not finish within the allotted time.
    #[error("streaming client `{operation}` timed out after {after:?}")]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },

    /// `stream` exited inside the launch grace window.
    #[error("stream exited during launch (exit code {code:?}): {output}")]
    ExitedEarly { code: Option<i32>, output: String },

    #[error("I/O error talking to the streaming client: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// `true` when the binary itself is missing or unusable, so retrying or
    /// pairing cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Spawn { .. })
    }
}

/// Final outcome of one pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    /// A success phrase was seen, or the client exited with status 0.
    Success,
    /// The client exited non-zero without a success phrase.
    Failed,
    /// Cancellation was requested while the client was still running.
    Cancelled,
}

/// Everything recorded about one pairing attempt.
#[derive(Debug, Clone)]
pub struct PairingReport {
    pub outcome: PairingOutcome,
    /// PID of the spawned client, if the OS reported one.
    pub pid: Option<u32>,
    /// Exit code once the child was reaped (`None` when killed by a signal).
    pub exit_code: Option<i32>,
    /// Distinct PINs shown, in display order.
    pub pins_shown: Vec<String>,
    /// Merged stdout/stderr lines, in arrival order.
    pub transcript: Vec<String>,
}

impl PairingReport {
    /// A report carrying only an outcome.  Handy for test doubles.
    pub fn with_outcome(outcome: PairingOutcome) -> Self {
        Self {
            outcome,
            pid: None,
            exit_code: None,
            pins_shown: Vec::new(),
            transcript: Vec::new(),
        }
    }
}

/// A stream subprocess that survived the launch grace window.
#[async_trait]
pub trait RunningStream: Send {
    /// PID of the stream process.
    fn pid(&self) -> Option<u32>;

    /// Waits for the stream to end and returns its exit code.
    async fn wait(&mut self) -> Result<Option<i32>, ClientError>;

    /// Kills the stream and reaps it.
    async fn terminate(&mut self);
}

/// The three operations the connection state machine needs.
///
/// Infrastructure implementations run the client binary; test
/// implementations record calls and return scripted results.
#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Capability probe: lists the host's apps.  `Ok` means we are paired.
    async fn list_apps(&self, host: &HostAddress) -> Result<Vec<String>, ClientError>;

    /// Runs one pairing attempt.  `cancel` is polled while the client runs.
    async fn pair(
        &self,
        host: &HostAddress,
        on_pin: PinCallback,
        cancel: Arc<AtomicBool>,
    ) -> Result<PairingReport, ClientError>;

    /// Launches a stream.  Fails if the client exits inside the grace window.
    async fn launch(
        &self,
        host: &HostAddress,
        params: &StreamParams,
    ) -> Result<Box<dyn RunningStream>, ClientError>;
}
