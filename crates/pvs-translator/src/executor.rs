//! External tool execution.
//!
//! Runs one conversion tool as a child process in its own process group,
//! drains stderr on a separate task while stdout is read to end-of-stream,
//! and enforces a timeout that kills the whole group. Exit code plus the
//! presence of the expected result file is the entire contract with a tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::ConversionError;
use crate::metrics::ConversionMetrics;
use crate::tools::ToolLocation;

/// Exit code reported when the process status could not be observed.
pub const UNOBSERVED_EXIT_CODE: i32 = -999;

/// How long to wait for the stderr drain once the process is gone.
const STDERR_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One external tool run.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Label used in logs and errors.
    pub tool: String,
    /// Executable path.
    pub program: PathBuf,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Upper bound on the run.
    pub timeout: Duration,
    /// File the tool is expected to produce.
    pub expected_output: Option<PathBuf>,
    /// Side-channel log the tool may write.
    pub job_log: Option<PathBuf>,
    /// PID file of a detached helper to clean up afterwards.
    pub pid_file: Option<PathBuf>,
}

impl ToolInvocation {
    /// Invocation of a resolved tool.
    pub fn new(tool: &ToolLocation, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            tool: tool.label.to_string(),
            program: tool.path.clone(),
            args,
            timeout,
            expected_output: None,
            job_log: None,
            pid_file: None,
        }
    }

    /// Require `path` to exist for the run to count as successful.
    pub fn expecting(mut self, path: impl Into<PathBuf>) -> Self {
        self.expected_output = Some(path.into());
        self
    }

    /// Capture `path` as the run's auxiliary log if it exists afterwards.
    pub fn with_job_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.job_log = Some(path.into());
        self
    }

    /// Kill the process named in `path` and delete the file afterwards.
    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = Some(path.into());
        self
    }
}

/// Outcome of one tool run.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    /// Exit status was acceptable and the result file exists.
    pub success: bool,
    /// Raw exit code, or [`UNOBSERVED_EXIT_CODE`].
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Content of the tool's side-channel log, if any.
    pub job_log: String,
    /// Result file the caller expects.
    pub result_file: Option<PathBuf>,
    /// The run hit its timeout and was killed.
    pub timed_out: bool,
    /// Wall time of the run.
    pub duration_ms: u64,
}

impl ToolResult {
    /// Settle the result file for tools whose output is found by scanning.
    ///
    /// `found` is the scanned file; when absent the result points at
    /// `fallback` and the run is marked failed.
    pub fn resolve_output(&mut self, found: Option<PathBuf>, fallback: PathBuf) {
        let exists = found.as_deref().is_some_and(Path::exists);
        self.success = self.success && exists;
        self.result_file = Some(found.unwrap_or(fallback));
    }

    /// The result file, if the run succeeded.
    pub fn output(&self) -> Option<&Path> {
        if self.success {
            self.result_file.as_deref()
        } else {
            None
        }
    }
}

/// Runs external tools with timeout and orphan cleanup.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    /// Exit code that still counts as success after a forced kill.
    tolerated_timeout_exit_code: i32,
    metrics: Arc<ConversionMetrics>,
}

impl ToolExecutor {
    /// Create an executor.
    pub fn new(tolerated_timeout_exit_code: i32, metrics: Arc<ConversionMetrics>) -> Self {
        Self {
            tolerated_timeout_exit_code,
            metrics,
        }
    }

    /// Shared metrics collector.
    pub fn metrics(&self) -> &Arc<ConversionMetrics> {
        &self.metrics
    }

    /// Run a tool to completion or timeout.
    ///
    /// Non-zero exits and timeouts are reported through the returned
    /// [`ToolResult`]; only a missing executable, a failed spawn or a broken
    /// output pipe are errors.
    #[instrument(skip(self, invocation), fields(tool = %invocation.tool))]
    pub async fn run(&self, invocation: &ToolInvocation) -> Result<ToolResult, ConversionError> {
        if !invocation.program.is_file() {
            return Err(ConversionError::ToolNotFound {
                tool: invocation.tool.clone(),
                path: invocation.program.clone(),
            });
        }

        let mut cmd = process_control::command(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            program = %invocation.program.display(),
            args = ?invocation.args,
            timeout_s = invocation.timeout.as_secs(),
            "Spawning tool process"
        );

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ConversionError::ToolSpawn {
            tool: invocation.tool.clone(),
            source,
        })?;
        let pid = child.id();

        let mut stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        });

        let mut stdout_buf = Vec::new();
        let waited = tokio::time::timeout(invocation.timeout, async {
            if let Some(out) = stdout.as_mut() {
                out.read_to_end(&mut stdout_buf).await?;
            }
            child.wait().await
        })
        .await;

        let (exit_code, timed_out) = match waited {
            Ok(Ok(status)) => (status.code().unwrap_or(UNOBSERVED_EXIT_CODE), false),
            Ok(Err(e)) => {
                if let Some(pid) = pid {
                    process_control::kill_tree(pid).await;
                }
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(ConversionError::Io(e));
            }
            Err(_) => {
                warn!(
                    pid = ?pid,
                    timeout_s = invocation.timeout.as_secs(),
                    "Tool timed out, killing process tree"
                );
                if let Some(pid) = pid {
                    process_control::kill_tree(pid).await;
                }
                let _ = child.start_kill();
                let code = match child.wait().await {
                    Ok(status) => status.code().unwrap_or(UNOBSERVED_EXIT_CODE),
                    Err(e) => {
                        debug!(error = %e, "Failed to reap killed tool process");
                        UNOBSERVED_EXIT_CODE
                    }
                };
                (code, true)
            }
        };
        drop(stdout);

        let stderr_bytes = match tokio::time::timeout(STDERR_JOIN_TIMEOUT, &mut stderr_task).await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                debug!(error = %e, "Stderr drain task failed");
                Vec::new()
            }
            Err(_) => {
                debug!("Stderr still held open by a descendant, abandoning drain");
                stderr_task.abort();
                Vec::new()
            }
        };

        let duration = start.elapsed();
        let mut stderr_text = String::from_utf8_lossy(&stderr_bytes).into_owned();
        if timed_out {
            stderr_text.push_str(&format!(
                "Timeout reached, killing process {}",
                pid.map_or_else(|| "unknown".to_string(), |p| p.to_string())
            ));
        }

        if let Some(pid_file) = &invocation.pid_file {
            if let Some(pid) = pid {
                // Leaked descendants keep the group alive after the leader exits.
                process_control::kill_tree(pid).await;
            }
            cleanup_pid_file(pid_file).await;
        }

        let job_log = match &invocation.job_log {
            Some(path) => read_job_log(path).await,
            None => String::new(),
        };

        let exit_ok = if timed_out {
            exit_code == self.tolerated_timeout_exit_code
        } else {
            exit_code == 0
        };
        let success = exit_ok
            && invocation
                .expected_output
                .as_deref()
                .is_none_or(Path::exists);

        let result = ToolResult {
            success,
            exit_code,
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: stderr_text,
            job_log,
            result_file: invocation.expected_output.clone(),
            timed_out,
            duration_ms: duration.as_millis() as u64,
        };

        debug!(stdout = %result.stdout, "Tool stdout");
        debug!(stderr = %result.stderr, "Tool stderr");
        if !result.job_log.is_empty() {
            debug!(log = %result.job_log, "Tool log");
        }
        info!(
            exit_code = result.exit_code,
            success = result.success,
            timed_out = result.timed_out,
            elapsed_ms = result.duration_ms,
            "Tool finished"
        );

        self.metrics
            .record_tool_run(duration, result.success, result.timed_out);

        Ok(result)
    }
}

/// Read a side-channel log, lossily; missing or unreadable logs are empty.
async fn read_job_log(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Failed to read tool log");
            }
            String::new()
        }
    }
}

/// Kill the process named in a PID file, then delete the file. Best-effort.
async fn cleanup_pid_file(path: &Path) {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Failed to read PID file");
            }
            return;
        }
    };

    match content.trim().parse::<u32>() {
        Ok(pid) => {
            if process_control::is_alive(pid).await {
                debug!(pid, "Killing orphaned helper process");
                process_control::kill_process(pid).await;
                process_control::kill_tree(pid).await;
            } else {
                debug!(pid, "Helper process already gone");
            }
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "PID file does not hold a process id");
        }
    }

    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Failed to delete PID file");
    }
}

/// Platform process-group handling via the system's own process tools.
mod process_control {
    use std::path::Path;
    use std::process::Stdio;

    use tokio::process::Command;
    use tracing::debug;

    /// A command whose child leads its own process group.
    #[cfg(unix)]
    pub fn command(program: &Path) -> Command {
        use std::os::unix::process::CommandExt;

        let mut std_cmd = std::process::Command::new(program);
        std_cmd.process_group(0);
        Command::from(std_cmd)
    }

    /// A command whose child starts a new process group without a console.
    #[cfg(windows)]
    pub fn command(program: &Path) -> Command {
        use std::os::windows::process::CommandExt;

        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

        let mut std_cmd = std::process::Command::new(program);
        std_cmd.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
        Command::from(std_cmd)
    }

    #[cfg(not(any(unix, windows)))]
    pub fn command(program: &Path) -> Command {
        Command::new(program)
    }

    /// Forcibly kill a process and everything it started.
    pub async fn kill_tree(pid: u32) {
        let status = if cfg!(windows) {
            Command::new("taskkill")
                .args(["/T", "/F", "/PID", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
        } else {
            Command::new("kill")
                .args(["-KILL", "--", &format!("-{pid}")])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
        };

        match status {
            Ok(status) if status.success() => debug!(pid, "Process tree killed"),
            Ok(status) => debug!(pid, code = ?status.code(), "Process tree already gone"),
            Err(e) => debug!(pid, error = %e, "Failed to run process kill command"),
        }
    }

    /// Forcibly kill one process by id, whatever group it belongs to.
    pub async fn kill_process(pid: u32) {
        let status = if cfg!(windows) {
            Command::new("taskkill")
                .args(["/F", "/PID", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
        } else {
            Command::new("kill")
                .args(["-KILL", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
        };

        match status {
            Ok(status) if status.success() => debug!(pid, "Process killed"),
            Ok(status) => debug!(pid, code = ?status.code(), "Process already gone"),
            Err(e) => debug!(pid, error = %e, "Failed to run process kill command"),
        }
    }

    /// Whether a process with this id is running.
    pub async fn is_alive(pid: u32) -> bool {
        if cfg!(windows) {
            let output = Command::new("tasklist")
                .args(["/FI", &format!("PID eq {pid}"), "/NH"])
                .stderr(Stdio::null())
                .output()
                .await;
            match output {
                Ok(output) => String::from_utf8_lossy(&output.stdout)
                    .split_whitespace()
                    .any(|token| token == pid.to_string()),
                Err(_) => false,
            }
        } else {
            Command::new("kill")
                .args(["-0", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .is_ok_and(|status| status.success())
        }
    }
}
