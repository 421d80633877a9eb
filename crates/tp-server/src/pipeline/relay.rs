//! Stream relay: copies process stdout into the response body channel while
//! racing process exit and the request deadline.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::sync::mpsc;
use tp_av::ProcessHandle;

use super::deadline::{CancelReason, Deadline};

/// Size of a single stdout read.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the relay and the HTTP body.
pub const CHANNEL_CAPACITY: usize = 8;

/// How long to wait for stderr to drain after the process is gone.
const STDERR_GRACE: Duration = Duration::from_secs(2);

pub type ChunkSender = mpsc::Sender<Bytes>;
pub type ChunkReceiver = mpsc::Receiver<Bytes>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Stdout reached EOF and the process exited.
    Completed,
    /// Deadline, shutdown, or client disconnect. The tree was killed.
    Cancelled(CancelReason),
    /// Reading stdout or waiting for the process failed.
    Failed(String),
}

/// What the relay observed.
#[derive(Debug, Clone)]
pub struct RelayReport {
    pub outcome: RelayOutcome,
    /// Only meaningful when the outcome is not `Cancelled`.
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub bytes: u64,
}

enum Pumped {
    Eof,
    ClientGone,
}

enum First {
    Copy(std::io::Result<Pumped>),
    Exit(std::io::Result<std::process::ExitStatus>),
    Expired(CancelReason),
}

/// Relay `handle`'s stdout into `tx` until EOF, exit, or `deadline`.
///
/// The process tree is always killed and reaped before this returns.
pub async fn relay(handle: &mut ProcessHandle, tx: &ChunkSender, deadline: &Deadline) -> RelayReport {
    let mut bytes = 0u64;
    let outcome = match handle.take_stdout() {
        Some(stdout) => race(handle, stdout, tx, deadline, &mut bytes).await,
        None => RelayOutcome::Failed("process stdout was not captured".into()),
    };

    handle.kill_tree().await;
    handle.finish_stderr(STDERR_GRACE).await;

    RelayReport {
        outcome,
        exit_code: handle.exit_code(),
        stderr: handle.stderr_tail(),
        bytes,
    }
}

async fn race(
    handle: &mut ProcessHandle,
    stdout: ChildStdout,
    tx: &ChunkSender,
    deadline: &Deadline,
    bytes: &mut u64,
) -> RelayOutcome {
    let copy = pump(stdout, tx, bytes);
    tokio::pin!(copy);

    let first = tokio::select! {
        r = &mut copy => First::Copy(r),
        s = handle.wait() => First::Exit(s),
        reason = deadline.expired() => First::Expired(reason),
    };

    match first {
        First::Expired(reason) => RelayOutcome::Cancelled(reason),
        First::Copy(r) => match copied(r) {
            RelayOutcome::Completed => {
                // Output is done; the exit code still has to arrive in time.
                tokio::select! {
                    s = handle.wait() => match s {
                        Ok(_) => RelayOutcome::Completed,
                        Err(e) => RelayOutcome::Failed(format!("failed to wait for process: {e}")),
                    },
                    reason = deadline.expired() => RelayOutcome::Cancelled(reason),
                }
            }
            other => other,
        },
        First::Exit(Err(e)) => RelayOutcome::Failed(format!("failed to wait for process: {e}")),
        First::Exit(Ok(_)) => {
            // Buffered output may still be in the pipe.
            tokio::select! {
                r = &mut copy => copied(r),
                reason = deadline.expired() => RelayOutcome::Cancelled(reason),
            }
        }
    }
}

fn copied(r: std::io::Result<Pumped>) -> RelayOutcome {
    match r {
        Ok(Pumped::Eof) => RelayOutcome::Completed,
        Ok(Pumped::ClientGone) => RelayOutcome::Cancelled(CancelReason::ClientDisconnected),
        Err(e) => RelayOutcome::Failed(format!("failed to read process output: {e}")),
    }
}

/// Chunked copy from stdout into the channel. Never buffers more than one
/// chunk beyond the channel capacity.
async fn pump(mut stdout: ChildStdout, tx: &ChunkSender, bytes: &mut u64) -> std::io::Result<Pumped> {
    loop {
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        let n = tokio::select! {
            r = stdout.read_buf(&mut buf) => r?,
            _ = tx.closed() => return Ok(Pumped::ClientGone),
        };
        if n == 0 {
            return Ok(Pumped::Eof);
        }
        *bytes += n as u64;
        if tx.send(buf.freeze()).await.is_err() {
            return Ok(Pumped::ClientGone);
        }
    }
}
