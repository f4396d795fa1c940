//! Leaf executor for external commands.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use opsrelay_core::duration_to_ms;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// One external command: program plus discrete arguments. Never a shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ProcessInvocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human readable form for logs and diagnostics.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ProcessRunError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {timeout_ms} ms")]
    Timeout {
        program: String,
        timeout_ms: u64,
        pid: Option<u32>,
    },
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutput, ProcessRunError>;
}

/// Grace period between SIGTERM and SIGKILL when a timed-out process group is
/// torn down.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Runs commands with `tokio::process`, so a slow command only parks its own
/// task. Each child leads its own process group; on timeout the whole group is
/// signalled and the child is reaped before the error is returned.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutput, ProcessRunError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessRunError::Launch {
            program: invocation.program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(command = %invocation.display_line(), pid, "process launched");

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let waited = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    terminate(&mut child, pid, &invocation.program).await;
                    stdout_task.abort();
                    stderr_task.abort();
                    warn!(
                        command = %invocation.display_line(),
                        pid,
                        timeout_ms = duration_to_ms(limit),
                        "process timed out and was killed"
                    );
                    return Err(ProcessRunError::Timeout {
                        program: invocation.program.clone(),
                        timeout_ms: duration_to_ms(limit),
                        pid,
                    });
                }
            },
            None => child.wait().await,
        };
        let status = waited.map_err(|source| ProcessRunError::Wait {
            program: invocation.program.clone(),
            source,
        })?;

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        debug!(
            command = %invocation.display_line(),
            exit_code = status.code(),
            "process exited"
        );
        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
        })
    }
}

/// Tears down the child's process group so helpers it forked (`sudo`'s
/// target, a shell's background job) do not outlive the timeout.
async fn terminate(child: &mut Child, pid: Option<u32>, program: &str) {
    if let Some(pid) = pid {
        signal_process_group(pid, GroupSignal::Terminate, program);
        let exited = matches!(
            tokio::time::timeout(TERMINATE_GRACE, child.wait()).await,
            Ok(Ok(_))
        );
        // Members of the group can outlive its leader.
        signal_process_group(pid, GroupSignal::Kill, program);
        if exited {
            return;
        }
        debug!(program, pid, "process ignored SIGTERM");
    }
    if let Err(error) = child.kill().await {
        warn!(program, %error, "failed to kill timed-out process");
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_process_group(pid: u32, signal: GroupSignal, program: &str) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    let signo = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    // SAFETY: kill(2) with a negative pid only signals the group the child
    // was placed in by `process_group(0)`; no memory is shared.
    let result = unsafe { libc::kill(-pgid, signo) };
    if result != 0 {
        let error = std::io::Error::last_os_error();
        if error.raw_os_error() != Some(libc::ESRCH) {
            warn!(program, pgid, ?signal, %error, "failed to signal process group");
        }
    }
}

#[cfg(not(unix))]
fn signal_process_group(_pid: u32, _signal: GroupSignal, _program: &str) {}

async fn read_stream<R>(stream: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        let _ = stream.read_to_end(&mut buffer).await;
    }
    buffer
}
