//! Builder for executing external tool commands with timeout support.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing external tool invocations.
///
/// The same builder feeds two execution styles: [`ToolCommand::execute`]
/// runs the program to completion and captures its output, while
/// [`crate::ProcessHandle::spawn`] starts it under supervision and hands
/// out its stdout as a stream.
///
/// Arguments are always passed as discrete tokens, never through a shell.
///
/// # Example
///
/// ```no_run
/// use tp_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> tp_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("yt-dlp"))
///     .arg("--get-title")
///     .arg("--")
///     .arg("https://youtu.be/dQw4w9WgXcQ")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time for [`ToolCommand::execute`].
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Short name used in logs and error messages (file name of the program).
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// A `tokio` command with the given stdio wiring. The child is killed if
    /// its handle is dropped.
    pub(crate) fn to_command(&self, stdout: Stdio, stderr: Stdio) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        cmd
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - Returns [`tp_core::Error::Tool`] if the process times out (message
    ///   includes the timeout duration). The child is killed in that case.
    /// - Returns [`tp_core::Error::Tool`] if the process exits with a non-zero
    ///   status (message includes stderr).
    /// - Returns [`tp_core::Error::Tool`] if spawning the process fails.
    pub async fn execute(&self) -> tp_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let child = self
            .to_command(Stdio::piped(), Stdio::piped())
            .spawn()
            .map_err(|e| tp_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        // Dropping the future on timeout drops the child, and kill_on_drop
        // takes it down.
        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(tp_core::Error::tool(
                        program_name,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            tool_output.stderr.trim()
                        ),
                    ));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(tp_core::Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => Err(tp_core::Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}
