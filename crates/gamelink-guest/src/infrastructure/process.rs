//! Short-lived helper subprocesses with a deadline.
//!
//! `avahi-browse`, `ip`, `ping`, and the client's `list` command are all
//! run the same way: capture stdout and stderr, give up after a timeout,
//! and never leave the child behind.  `kill_on_drop` ensures that a child
//! abandoned by the timeout is killed; tokio reaps it in the background.
//!
//! Long-running client processes (`pair`, `stream`) may be wrappers such as
//! `flatpak run`, so they start in a process group of their own and are
//! stopped with [`kill_process_group`] to take the real client down too.

use std::process::{Output, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Failure to run a helper command to completion.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` did not finish within {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("I/O error waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs `command` to completion, capturing its output.
///
/// Stdin is closed.  A non-zero exit is *not* an error here; callers
/// inspect `Output::status`.
pub async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<Output, ProcessError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(ProcessError::Wait { program, source }),
        Err(_) => Err(ProcessError::TimedOut {
            program,
            after: timeout,
        }),
    }
}

/// Makes the child the leader of a new process group (Unix only).
pub fn isolate_process_group(command: &mut Command) {
    #[cfg(unix)]
    {
        command.process_group(0);
    }
    #[cfg(not(unix))]
    {
        let _ = command;
    }
}

/// Sends `SIGKILL` to the process group led by `pid`.
///
/// Only meaningful for children started with [`isolate_process_group`].
/// A no-op outside Unix; callers still kill the direct child themselves.
pub fn kill_process_group(pid: u32) {
    #[cfg(unix)]
    {
        let Ok(pgid) = i32::try_from(pid) else {
            return;
        };
        // SAFETY: kill(2) only takes integers; a negative pid names a group.
        let ret = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if ret != 0 {
            tracing::debug!(pid, error = %std::io::Error::last_os_error(), "Process group already gone");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// Joins stdout and stderr into one trimmed, lossily decoded string.
pub fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text.trim().to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_status() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello; echo oops >&2; exit 3"]);

        let output = run_with_timeout(cmd, Duration::from_secs(5)).await.unwrap();

        assert_eq!(output.status.code(), Some(3));
        assert_eq!(combined_output(&output), "hello\noops");
    }

    #[tokio::test]
    async fn test_slow_command_times_out() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);

        let started = std::time::Instant::now();
        let result = run_with_timeout(cmd, Duration::from_millis(100)).await;

        assert!(matches!(result, Err(ProcessError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_group_kill_reaches_grandchildren() {
        // Arrange: a wrapper shell that forks a long-lived worker.
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30 & echo $!; wait"])
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut cmd);
        let mut child = cmd.spawn().unwrap();
        let mut stdout = tokio::io::BufReader::new(child.stdout.take().unwrap());
        let mut line = String::new();
        tokio::io::AsyncBufReadExt::read_line(&mut stdout, &mut line)
            .await
            .unwrap();
        let worker: u32 = line.trim().parse().unwrap();

        // Act
        kill_process_group(child.id().unwrap());
        child.wait().await.unwrap();

        // Assert: the worker is gone, or at most a zombie awaiting its reaper.
        assert!(wait_until_dead(worker).await, "worker {worker} survived");
    }

    /// Polls `/proc` (Linux) for up to two seconds.
    async fn wait_until_dead(pid: u32) -> bool {
        if !cfg!(target_os = "linux") {
            return true;
        }
        for _ in 0..100 {
            let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
                return true;
            };
            // Field 3, after the parenthesised command name, is the state.
            let state = stat.rsplit(')').next().unwrap_or("").trim_start();
            if state.starts_with('Z') {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let cmd = Command::new("/nonexistent/gamelink-helper");

        let result = run_with_timeout(cmd, Duration::from_secs(1)).await;

        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
