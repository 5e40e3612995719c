//! PairingSession: runs the client's `pair` command and watches its output.
//!
//! # How pairing works (for beginners)
//!
//! `client pair <host>` contacts the host, prints a four-to-six digit PIN,
//! and blocks until someone types that PIN on the host.  Progress is only
//! visible as text, so the session merges stdout and stderr into a single
//! line stream and classifies each line:
//!
//! ```text
//!  line                                   action
//!  ─────────────────────────────────────  ───────────────────────────────────
//!  "...PIN on the target PC: 482910"      hand "482910" to the PIN callback
//!  "Successfully paired" / "Already ..."  done: Success, stop the client
//!  anything else                          keep it in the transcript
//!  end of output                          exit status 0 => Success, else Failed
//! ```
//!
//! The read loop wakes at least every `poll_interval` to check the cancel
//! flag.  Whatever the outcome, the child is reaped before returning, so
//! no pairing process outlives its session.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gamelink_core::protocol::pairing::{classify_line, TranscriptSignal};
use gamelink_core::HostAddress;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ClientCommand;
use crate::application::stream_client::{
    ClientError, PairingOutcome, PairingReport, PinCallback,
};
use crate::infrastructure::process::{isolate_process_group, kill_process_group};

/// How often the read loop checks for cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How the child ended after its output closed.
enum WaitEnd {
    Exited(Option<i32>),
    Cancelled(Option<i32>),
}

/// One-shot driver of the `pair` subcommand.
#[derive(Debug, Clone)]
pub struct PairingSession {
    command: ClientCommand,
    poll_interval: Duration,
}

impl PairingSession {
    pub fn new(command: ClientCommand) -> Self {
        Self {
            command,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs one pairing attempt against `host`.
    ///
    /// `on_pin` is invoked on the blocking pool, once per distinct PIN, and
    /// is not awaited.
    ///
    /// # Errors
    ///
    /// [`ClientError::Spawn`] when the client cannot be started and
    /// [`ClientError::Io`] when waiting on it fails.
    pub async fn run(
        &self,
        host: &HostAddress,
        on_pin: PinCallback,
        cancel: Arc<AtomicBool>,
    ) -> Result<PairingReport, ClientError> {
        let attempt_id = Uuid::new_v4();
        let mut cmd = self.command.build("pair", host);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut cmd);
        let mut child = cmd.spawn().map_err(|source| ClientError::Spawn {
            program: self.command.program().to_string(),
            source,
        })?;
        let pid = child.id();
        info!(%attempt_id, %host, ?pid, "Pairing started");

        let (tx, mut rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx.clone());
        }
        drop(tx);

        let mut transcript = Vec::new();
        let mut pins_shown: Vec<String> = Vec::new();
        let verdict = loop {
            if cancel.load(Ordering::SeqCst) {
                break Some(PairingOutcome::Cancelled);
            }
            let line = match tokio::time::timeout(self.poll_interval, rx.recv()).await {
                Err(_) => continue,
                Ok(None) => break None,
                Ok(Some(line)) => line,
            };
            debug!(%attempt_id, line = %line, "pair");
            let signal = classify_line(&line);
            transcript.push(line);
            match signal {
                TranscriptSignal::PinShown(pin) if !pins_shown.contains(&pin) => {
                    info!(%attempt_id, pin = %pin, "Client displayed a PIN for the host");
                    pins_shown.push(pin.clone());
                    let callback = Arc::clone(&on_pin);
                    drop(tokio::task::spawn_blocking(move || callback(pin)));
                }
                TranscriptSignal::Paired => break Some(PairingOutcome::Success),
                _ => {}
            }
        };
        drop(rx);

        let (outcome, exit_code) = match verdict {
            Some(outcome) => (outcome, stop_child(&mut child).await),
            None => match self.wait_or_cancel(&mut child, &cancel).await? {
                WaitEnd::Exited(Some(0)) => (PairingOutcome::Success, Some(0)),
                WaitEnd::Exited(code) => (PairingOutcome::Failed, code),
                WaitEnd::Cancelled(code) => (PairingOutcome::Cancelled, code),
            },
        };

        info!(%attempt_id, ?outcome, ?exit_code, "Pairing finished");
        debug!(%attempt_id, ?transcript, "Pairing transcript");
        Ok(PairingReport {
            outcome,
            pid,
            exit_code,
            pins_shown,
            transcript,
        })
    }

    /// Waits for the child to exit after its output closed, still honouring
    /// cancellation.
    async fn wait_or_cancel(
        &self,
        child: &mut Child,
        cancel: &AtomicBool,
    ) -> Result<WaitEnd, ClientError> {
        loop {
            match tokio::time::timeout(self.poll_interval, child.wait()).await {
                Ok(status) => return Ok(WaitEnd::Exited(status?.code())),
                Err(_) if cancel.load(Ordering::SeqCst) => {
                    return Ok(WaitEnd::Cancelled(stop_child(child).await))
                }
                Err(_) => {}
            }
        }
    }
}

/// Kills `child` with its process group and reaps it.  Returns its exit
/// code, if it had one.
async fn stop_child(child: &mut Child) -> Option<i32> {
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Pairing client already exited");
    }
    match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(error = %e, "Failed to reap pairing client");
            None
        }
    }
}

/// Forwards each line of `reader` into `tx` until EOF or the receiver is gone.
fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
