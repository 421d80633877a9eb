//! Supervision of a single long-running external process.
//!
//! A [`ProcessHandle`] owns exactly one child. Its stdout is handed out as a
//! raw byte stream, its stderr is drained in the background into a bounded
//! tail buffer, and [`ProcessHandle::kill_tree`] takes down the child together
//! with everything it spawned.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

use crate::command::ToolCommand;

/// Number of trailing stderr lines kept for diagnostics.
pub const STDERR_TAIL_LINES: usize = 64;

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// Handle to a running (or exited) external process.
///
/// Not `Clone`: the handle is the single owner of the child, and every
/// mutating operation takes `&mut self`.
#[derive(Debug)]
pub struct ProcessHandle {
    tool: String,
    child: Child,
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    stderr_tail: StderrTail,
    stderr_task: Option<JoinHandle<()>>,
    exit: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Spawn `cmd` with stdout and stderr piped and stdin closed.
    ///
    /// On Unix the child becomes the leader of a fresh process group, so
    /// [`kill_tree`](Self::kill_tree) can reach its descendants.
    pub fn spawn(cmd: &ToolCommand) -> tp_core::Result<Self> {
        let tool = cmd.program_name();
        let mut command = cmd.to_command(Stdio::piped(), Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| tp_core::Error::tool(&tool, format!("failed to spawn: {e}")))?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr_tail: StderrTail = Arc::new(Mutex::new(VecDeque::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(drain_stderr(tool.clone(), pid, stderr, stderr_tail.clone()))
        });

        tracing::debug!(tool = %tool, pid = ?pid, args = ?cmd.get_args(), "Spawned process");

        Ok(Self {
            tool,
            child,
            pid,
            stdout,
            stderr_tail,
            stderr_task,
            exit: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take ownership of the stdout stream. Returns `None` on the second call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Wait for the process to exit.
    ///
    /// Cancel-safe: dropping the future leaves the handle usable, and a later
    /// call resumes waiting.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Whether the process is known to have exited.
    pub fn has_exited(&mut self) -> bool {
        if self.exit.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                true
            }
            _ => false,
        }
    }

    /// Exit code, available only after the process has exited. `None` also
    /// when the process was terminated by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.and_then(|s| s.code())
    }

    /// Kill the process and all of its descendants, then reap it.
    ///
    /// Never fails: errors (including "already exited") are logged and
    /// swallowed.
    pub async fn kill_tree(&mut self) {
        self.signal_group();

        if self.has_exited() {
            return;
        }

        if let Err(e) = self.child.start_kill() {
            tracing::debug!(tool = %self.tool, pid = ?self.pid, error = %e, "start_kill failed");
        }
        match self.child.wait().await {
            Ok(status) => {
                tracing::debug!(tool = %self.tool, pid = ?self.pid, %status, "Process killed");
                self.exit = Some(status);
            }
            Err(e) => {
                tracing::warn!(tool = %self.tool, pid = ?self.pid, error = %e, "Failed to reap killed process");
            }
        }
    }

    /// Wait up to `grace` for the stderr drain to reach EOF, so the tail is
    /// complete. The drain is aborted if it overruns.
    ///
    /// Call after the process has exited or been killed.
    pub async fn finish_stderr(&mut self, grace: Duration) {
        let Some(mut task) = self.stderr_task.take() else {
            return;
        };
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            tracing::debug!(tool = %self.tool, pid = ?self.pid, "stderr drain overran, aborting");
            task.abort();
        }
    }

    /// The drained stderr tail, newline-joined.
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[cfg(unix)]
    fn signal_group(&self) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else { return };
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => tracing::debug!(tool = %self.tool, pid, "Sent SIGKILL to process group"),
            // ESRCH: the group is already gone.
            Err(e) => tracing::trace!(tool = %self.tool, pid, error = ?e, "killpg failed"),
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&self) {}
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.exit.is_none() {
            self.signal_group();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Read stderr line by line until EOF, keeping the last
/// [`STDERR_TAIL_LINES`] lines.
async fn drain_stderr(tool: String, pid: Option<u32>, stderr: ChildStderr, tail: StderrTail) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(tool = %tool, pid = ?pid, "stderr: {line}");
                let mut tail = tail.lock();
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                tracing::debug!(tool = %tool, pid = ?pid, error = %e, "stderr read failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::io::AsyncReadExt;

    fn sh(script: &str) -> ToolCommand {
        let mut cmd = ToolCommand::new(PathBuf::from("sh"));
        cmd.args(["-c", script]);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_exit_code_and_stderr() {
        let mut handle = ProcessHandle::spawn(&sh("printf 'abc'; echo 'boom' >&2; exit 3")).unwrap();
        let mut stdout = handle.take_stdout().unwrap();
        assert!(handle.take_stdout().is_none());

        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");

        let status = handle.wait().await.unwrap();
        assert!(!status.success());
        assert_eq!(handle.exit_code(), Some(3));

        handle.finish_stderr(Duration::from_secs(5)).await;
        assert_eq!(handle.stderr_tail(), "boom");
    }

    #[tokio::test]
    async fn exit_code_unknown_before_exit() {
        let mut handle = ProcessHandle::spawn(&sh("sleep 5")).unwrap();
        assert_eq!(handle.exit_code(), None);
        assert!(!handle.has_exited());
        handle.kill_tree().await;
        assert!(handle.has_exited());
    }

    #[tokio::test]
    async fn stderr_tail_is_bounded() {
        let mut handle = ProcessHandle::spawn(&sh(
            "i=1; while [ $i -le 100 ]; do echo \"line $i\" >&2; i=$((i+1)); done",
        ))
        .unwrap();
        handle.wait().await.unwrap();
        handle.finish_stderr(Duration::from_secs(5)).await;

        let tail = handle.stderr_tail();
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines.first(), Some(&"line 37"));
        assert_eq!(lines.last(), Some(&"line 100"));
    }

    #[tokio::test]
    async fn kill_tree_reaches_grandchildren() {
        // The backgrounded sleep inherits stdout; EOF on the pipe means every
        // holder of the write end is gone.
        let mut handle = ProcessHandle::spawn(&sh("sleep 30 & echo started; wait")).unwrap();
        let mut stdout = handle.take_stdout().unwrap();

        let mut first = [0u8; 8];
        stdout.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"started\n");

        handle.kill_tree().await;
        assert!(handle.has_exited());
        assert_eq!(handle.exit_code(), None);

        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stdout.read_to_end(&mut rest))
            .await
            .expect("stdout should reach EOF once the tree is dead")
            .unwrap();
    }

    #[tokio::test]
    async fn kill_tree_after_exit_is_noop() {
        let mut handle = ProcessHandle::spawn(&sh("exit 0")).unwrap();
        handle.wait().await.unwrap();
        handle.kill_tree().await;
        assert_eq!(handle.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn wait_is_cancel_safe() {
        let mut handle = ProcessHandle::spawn(&sh("sleep 0.3; exit 4")).unwrap();
        let early = tokio::time::timeout(Duration::from_millis(20), handle.wait()).await;
        assert!(early.is_err());
        handle.wait().await.unwrap();
        assert_eq!(handle.exit_code(), Some(4));
    }

    #[tokio::test]
    async fn spawn_missing_program_fails() {
        let cmd = ToolCommand::new(PathBuf::from("/nonexistent/yt-dlp"));
        let err = ProcessHandle::spawn(&cmd).unwrap_err();
        assert_eq!(err.http_status(), 500);
    }
}
