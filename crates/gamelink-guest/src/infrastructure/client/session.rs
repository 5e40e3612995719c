//! A running `stream` subprocess.
//!
//! The stream can run for hours, so its stdout and stderr are drained
//! continuously (a full pipe would block the client).  The last lines are
//! kept for the error message when the stream dies early.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::stream_client::{ClientError, RunningStream};
use crate::infrastructure::process::kill_process_group;

/// Lines of client output kept for diagnostics.
const TAIL_LINES: usize = 50;

/// Bounded buffer of the most recent output lines.
#[derive(Debug, Clone, Default)]
pub struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl OutputTail {
    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// The buffered lines joined by newlines.
    pub fn text(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Drains `reader` line by line into the tail until EOF.
    pub fn spawn_reader<R>(&self, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(line = %line, "stream");
                tail.push(line);
            }
        })
    }
}

/// [`RunningStream`] backed by a `tokio` child process.
#[derive(Debug)]
pub struct CliStream {
    child: Child,
    tail: OutputTail,
}

impl CliStream {
    pub fn new(child: Child, tail: OutputTail) -> Self {
        Self { child, tail }
    }
}

#[async_trait]
impl RunningStream for CliStream {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<Option<i32>, ClientError> {
        let status = self.child.wait().await?;
        if status.success() {
            info!("Stream client exited normally");
        } else {
            warn!(%status, output = %self.tail.text(), "Stream client exited with failure");
        }
        Ok(status.code())
    }

    async fn terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            kill_process_group(pid);
        }
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Stream client was already gone");
        }
    }
}
