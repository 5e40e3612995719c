//! ConnectionController: drives one host from "found" to "streaming".
//!
//! # The sequence (for beginners)
//!
//! ```text
//!   connect(host)
//!       │
//!       ▼
//!   ┌────────────┐  list ok   ┌──────────┐  alive after grace  ┌───────────┐
//!   │ Connecting │──────────▶│  launch  │───────────────────▶│ Streaming │
//!   └────────────┘            └──────────┘                     └───────────┘
//!       │ list fails                                               │ exits /
//!       ▼                                                          │ disconnect
//!   ┌────────────┐  success   ┌──────────────────────┐             ▼
//!   │  Pairing   │──────────▶│ Connecting (retry:    │         ┌──────┐
//!   └────────────┘            │ up to N probes, 1s    │         │ Idle │
//!       │ failed + host       │ apart, no re-pairing) │         └──────┘
//!       │ still refuses       └──────────────────────┘
//!       ▼
//!     Idle (error)
//! ```
//!
//! The capability probe (the client's `list` command) is the only test of
//! "are we paired?".  A failed pairing attempt is re-checked with one more
//! probe before it is reported, because the client's exit status does not
//! always match what the host recorded.
//!
//! # Concurrency
//!
//! The controller is shared by reference, and the [`ConnectionContext`] it
//! updates is handed in by whoever builds it.  A second
//! [`ConnectionController::connect`] while one is already `Connecting`,
//! `Pairing`, or `Streaming` returns [`ConnectOutcome::AlreadyInProgress`]
//! without touching the client.
//!
//! The one exception is [`ConnectionController::retry_after_pairing`],
//! which may join a sequence that is still connecting or pairing.  Joined
//! sequences share the slot:
//!
//! - the slot counts its owners and only falls back to `Idle` when the last
//!   one leaves without a stream running;
//! - only one of them may launch; the others end with `AlreadyInProgress`;
//! - a pending cancel applies to all of them.  The flag is only cleared
//!   when a fresh sequence starts from `Idle`.
//!
//! [`ConnectionController::cancel`] sets that flag; it is checked at every
//! step boundary and polled by the pairing subprocess loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gamelink_core::{HostAddress, PinError, PinToken, StreamParams};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::stream_client::{
    ClientError, PairingOutcome, PinCallback, RunningStream, StreamClient,
};

/// Probe attempts after a successful pairing.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Delay between post-pairing probes.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

// ── State ─────────────────────────────────────────────────────────────────────

/// Where the controller currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Pairing,
    Streaming,
}

#[derive(Debug)]
struct Slot {
    state: ConnectionState,
    host: Option<HostAddress>,
    /// Sequences currently running against this slot.
    owners: u32,
    /// Set while one sequence is launching; nobody else may.
    launch_claimed: bool,
    stream_stop: Option<oneshot::Sender<()>>,
    stream_generation: u64,
}

/// Shared connection state, readable from any thread.
///
/// The sync mutex is never held across an `.await`.
#[derive(Debug)]
pub struct ConnectionContext {
    slot: Mutex<Slot>,
    cancel_requested: Arc<AtomicBool>,
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: ConnectionState::Idle,
                host: None,
                owners: 0,
                launch_claimed: false,
                stream_stop: None,
                stream_generation: 0,
            }),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// The host of the current (or last streaming) sequence.
    pub fn host(&self) -> Option<HostAddress> {
        self.lock().host.clone()
    }

    /// `true` while a sequence is probing or pairing.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Pairing
        )
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_requested)
    }

    /// Claims the context for a new sequence.
    ///
    /// A post-pairing retry may join a sequence that is still connecting,
    /// but nothing starts while a stream is running.  Only a start from
    /// `Idle` clears a pending cancel.
    fn try_begin(&self, host: &HostAddress, post_pairing_retry: bool) -> bool {
        let mut slot = self.lock();
        match slot.state {
            ConnectionState::Idle => {
                slot.state = ConnectionState::Connecting;
                slot.host = Some(host.clone());
                slot.owners = 1;
                slot.launch_claimed = false;
                self.cancel_requested.store(false, Ordering::SeqCst);
                true
            }
            ConnectionState::Connecting | ConnectionState::Pairing if post_pairing_retry => {
                slot.owners += 1;
                true
            }
            _ => false,
        }
    }

    /// Records progress of a running sequence.  Never overrides `Idle` or a
    /// stream another sequence has started.
    fn set_progress(&self, state: ConnectionState) {
        let mut slot = self.lock();
        if matches!(
            slot.state,
            ConnectionState::Connecting | ConnectionState::Pairing
        ) {
            slot.state = state;
        }
    }

    fn is_streaming(&self) -> bool {
        self.state() == ConnectionState::Streaming
    }

    /// Reserves the single launch.  `false` when a stream is already live
    /// or another sequence is launching.
    fn claim_launch(&self, host: &HostAddress) -> bool {
        let mut slot = self.lock();
        if slot.launch_claimed || slot.state == ConnectionState::Streaming {
            return false;
        }
        slot.launch_claimed = true;
        slot.host = Some(host.clone());
        true
    }

    fn release_launch(&self) {
        self.lock().launch_claimed = false;
    }

    /// A sequence ended without a stream of its own.  The slot returns to
    /// `Idle` once its last owner has left, unless a stream is running.
    fn leave(&self) {
        let mut slot = self.lock();
        slot.owners = slot.owners.saturating_sub(1);
        if slot.owners == 0 && slot.state != ConnectionState::Streaming {
            slot.state = ConnectionState::Idle;
            slot.host = None;
            slot.launch_claimed = false;
        }
    }

    /// The launching sequence hands its stream to the slot and leaves.
    fn enter_streaming(&self, stop: oneshot::Sender<()>) -> u64 {
        let mut slot = self.lock();
        slot.owners = slot.owners.saturating_sub(1);
        slot.launch_claimed = false;
        slot.state = ConnectionState::Streaming;
        slot.stream_generation += 1;
        slot.stream_stop = Some(stop);
        slot.stream_generation
    }

    /// Returns to `Idle` unless a newer stream has replaced this one.
    /// Sequences still running keep the slot in `Connecting`.
    fn stream_ended(&self, generation: u64) {
        let mut slot = self.lock();
        if slot.stream_generation == generation && slot.state == ConnectionState::Streaming {
            slot.stream_stop = None;
            if slot.owners == 0 {
                slot.state = ConnectionState::Idle;
                slot.host = None;
            } else {
                slot.state = ConnectionState::Connecting;
            }
        }
    }

    fn take_stream_stop(&self) -> Option<oneshot::Sender<()>> {
        self.lock().stream_stop.take()
    }
}

// ── Errors and results ────────────────────────────────────────────────────────

/// Why a connect sequence ended without a stream.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection cancelled")]
    Cancelled,

    #[error("host {host} still refuses us after {attempts} probe attempts: {source}")]
    NotPaired {
        host: HostAddress,
        attempts: u32,
        #[source]
        source: ClientError,
    },

    #[error("pairing with {host} failed (exit code {exit_code:?})")]
    PairingFailed {
        host: HostAddress,
        exit_code: Option<i32>,
    },

    #[error("failed to launch stream: {0}")]
    Launch(#[source] ClientError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("invalid PIN: {0}")]
    InvalidPin(#[from] PinError),

    #[error("no host answered PIN {0}")]
    PinNotFound(String),

    #[error("PIN lookup failed: {0}")]
    PinLookup(String),
}

/// Successful results of [`ConnectionController::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A stream is running.
    Streaming { pid: Option<u32> },
    /// Another sequence or stream is active; nothing was done.
    AlreadyInProgress,
}

/// How many times, and how far apart, to probe after pairing.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Resolves a PIN to the host that announced it.
#[async_trait]
pub trait PinLookup: Send + Sync {
    async fn lookup(&self, pin: &PinToken) -> Result<Option<HostAddress>, String>;
}

// ── Controller ────────────────────────────────────────────────────────────────

/// Runs connect sequences against a [`StreamClient`].
pub struct ConnectionController {
    client: Arc<dyn StreamClient>,
    context: Arc<ConnectionContext>,
    on_pin: PinCallback,
    retry: RetryPolicy,
}

impl ConnectionController {
    /// Creates a controller that reports through `context`.  `on_pin`
    /// receives every PIN shown during pairing.
    pub fn new(
        client: Arc<dyn StreamClient>,
        context: Arc<ConnectionContext>,
        on_pin: PinCallback,
    ) -> Self {
        Self {
            client,
            context,
            on_pin,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shared handle to the live state.
    pub fn context(&self) -> Arc<ConnectionContext> {
        Arc::clone(&self.context)
    }

    /// Starts a fresh connect sequence.
    pub async fn connect(
        &self,
        host: HostAddress,
        params: &StreamParams,
    ) -> Result<ConnectOutcome, ConnectError> {
        self.start(host, params, false).await
    }

    /// Re-enters the sequence as a post-pairing retry (probe with retries,
    /// never pair again).  Used when pairing finished out of band.  May
    /// join a sequence that is still connecting or pairing.
    pub async fn retry_after_pairing(
        &self,
        host: HostAddress,
        params: &StreamParams,
    ) -> Result<ConnectOutcome, ConnectError> {
        self.start(host, params, true).await
    }

    /// Resolves `pin` on the LAN and connects to whoever answered.
    pub async fn connect_by_pin(
        &self,
        pin: &str,
        lookup: &dyn PinLookup,
        params: &StreamParams,
    ) -> Result<ConnectOutcome, ConnectError> {
        let pin = PinToken::parse(pin)?;
        let host = lookup
            .lookup(&pin)
            .await
            .map_err(ConnectError::PinLookup)?
            .ok_or_else(|| ConnectError::PinNotFound(pin.to_string()))?;
        info!(%host, "PIN resolved");
        self.connect(host, params).await
    }

    /// Requests cancellation of the running sequence.
    pub fn cancel(&self) {
        self.context.request_cancel();
    }

    /// Stops the running stream.  Returns `false` when none was running.
    ///
    /// The state returns to `Idle` once the stream process has been reaped.
    pub fn disconnect(&self) -> bool {
        match self.context.take_stream_stop() {
            Some(stop) => {
                // The watcher may already be gone if the stream just exited.
                let _ = stop.send(());
                true
            }
            None => false,
        }
    }

    async fn start(
        &self,
        host: HostAddress,
        params: &StreamParams,
        post_pairing_retry: bool,
    ) -> Result<ConnectOutcome, ConnectError> {
        if !self.context.try_begin(&host, post_pairing_retry) {
            debug!(%host, state = ?self.context.state(), "Connect ignored: another sequence is active");
            return Ok(ConnectOutcome::AlreadyInProgress);
        }

        let attempt_id = Uuid::new_v4();
        info!(%attempt_id, %host, post_pairing_retry, "Connect sequence started");

        match self.run_sequence(&host, params, post_pairing_retry).await {
            Ok(Some(stream)) => {
                let pid = stream.pid();
                self.watch_stream(stream);
                info!(%attempt_id, %host, ?pid, "Streaming");
                Ok(ConnectOutcome::Streaming { pid })
            }
            Ok(None) => {
                self.context.leave();
                info!(%attempt_id, %host, "Another sequence owns the stream; stepping aside");
                Ok(ConnectOutcome::AlreadyInProgress)
            }
            Err(e) => {
                self.context.leave();
                match &e {
                    ConnectError::Cancelled => info!(%attempt_id, %host, "Connect cancelled"),
                    other => warn!(%attempt_id, %host, error = %other, "Connect failed"),
                }
                Err(e)
            }
        }
    }

    /// `Ok(None)` means a joined sequence got the stream first.
    async fn run_sequence(
        &self,
        host: &HostAddress,
        params: &StreamParams,
        mut post_pairing: bool,
    ) -> Result<Option<Box<dyn RunningStream>>, ConnectError> {
        loop {
            self.checkpoint()?;
            if self.context.is_streaming() {
                return Ok(None);
            }
            self.context.set_progress(ConnectionState::Connecting);

            let probe = if post_pairing {
                self.probe_with_retries(host).await?
            } else {
                self.client.list_apps(host).await
            };
            self.checkpoint()?;

            match probe {
                Ok(apps) => return self.launch(host, params, &apps).await,
                Err(e) if e.is_fatal() => return Err(ConnectError::Client(e)),
                Err(e) if post_pairing => {
                    return Err(ConnectError::NotPaired {
                        host: host.clone(),
                        attempts: self.retry.attempts.max(1),
                        source: e,
                    })
                }
                Err(e) => {
                    info!(%host, error = %e, "Host refused capability probe; pairing");
                    self.pair(host).await?;
                    post_pairing = true;
                }
            }
        }
    }

    /// Probes up to `retry.attempts` times.  The outer `Result` carries
    /// cancellation; the inner one is the last probe result.
    async fn probe_with_retries(
        &self,
        host: &HostAddress,
    ) -> Result<Result<Vec<String>, ClientError>, ConnectError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            self.checkpoint()?;
            match self.client.list_apps(host).await {
                Ok(apps) => return Ok(Ok(apps)),
                Err(e) if e.is_fatal() || attempt >= attempts => return Ok(Err(e)),
                Err(e) => {
                    debug!(%host, attempt, attempts, error = %e, "Post-pairing probe failed");
                }
            }
            attempt += 1;
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    async fn pair(&self, host: &HostAddress) -> Result<(), ConnectError> {
        self.context.set_progress(ConnectionState::Pairing);
        let report = self
            .client
            .pair(host, Arc::clone(&self.on_pin), self.context.cancel_handle())
            .await?;
        debug!(%host, outcome = ?report.outcome, transcript = ?report.transcript, "Pairing finished");

        match report.outcome {
            PairingOutcome::Success => Ok(()),
            PairingOutcome::Cancelled => Err(ConnectError::Cancelled),
            PairingOutcome::Failed => {
                self.checkpoint()?;
                match self.client.list_apps(host).await {
                    Ok(_) => {
                        info!(%host, "Pairing reported failure but the host now accepts us");
                        Ok(())
                    }
                    Err(_) => Err(ConnectError::PairingFailed {
                        host: host.clone(),
                        exit_code: report.exit_code,
                    }),
                }
            }
        }
    }

    async fn launch(
        &self,
        host: &HostAddress,
        params: &StreamParams,
        apps: &[String],
    ) -> Result<Option<Box<dyn RunningStream>>, ConnectError> {
        if !apps.is_empty() && !apps.iter().any(|a| a == &params.app) {
            warn!(app = %params.app, available = ?apps, "Requested app is not in the host's list");
        }
        self.checkpoint()?;
        if !self.context.claim_launch(host) {
            return Ok(None);
        }

        let mut stream = match self.client.launch(host, params).await {
            Ok(stream) => stream,
            Err(e) => {
                self.context.release_launch();
                return Err(ConnectError::Launch(e));
            }
        };

        if self.context.is_cancel_requested() {
            stream.terminate().await;
            self.context.release_launch();
            return Err(ConnectError::Cancelled);
        }
        Ok(Some(stream))
    }

    /// Moves to `Streaming` and spawns the task that returns us to `Idle`
    /// when the stream ends or [`Self::disconnect`] is called.
    fn watch_stream(&self, mut stream: Box<dyn RunningStream>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let generation = self.context.enter_streaming(stop_tx);
        let context = Arc::clone(&self.context);

        tokio::spawn(async move {
            tokio::select! {
                status = stream.wait() => match status {
                    Ok(code) => info!(?code, "Stream ended"),
                    Err(e) => warn!(error = %e, "Lost track of the stream process"),
                },
                _ = stop_rx => {
                    info!("Stopping stream");
                    stream.terminate().await;
                }
            }
            context.stream_ended(generation);
        });
    }

    fn checkpoint(&self) -> Result<(), ConnectError> {
        if self.context.is_cancel_requested() {
            Err(ConnectError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
