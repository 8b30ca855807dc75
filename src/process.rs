//! Bounded subprocess execution
//!
//! [`run_bounded`] spawns a command with piped output streams, waits for it
//! under a hard wall-clock limit and always reclaims the process: on timeout
//! the whole process group is killed and reaped, and the stream readers are
//! given a short grace period before being aborted.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long to keep draining stdout/stderr after the process is gone.
///
/// Detached grandchildren may hold the pipes open indefinitely.
const STREAM_GRACE: Duration = Duration::from_secs(2);

/// Captured result of a process that exited on its own
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, `None` when terminated by a signal
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", limit.as_secs())]
    TimedOut {
        program: String,
        limit: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run `command` to completion or until `limit` elapses.
pub async fn run_bounded(
    mut command: Command,
    limit: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    command.process_group(0);

    let started = Instant::now();
    let mut child = command.spawn().map_err(|source| ProcessError::Launch {
        program: program.clone(),
        source,
    })?;

    let stdout = child.stdout.take().map(|pipe| tokio::spawn(read_stream(pipe)));
    let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_stream(pipe)));

    match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => {
            let elapsed = started.elapsed();
            Ok(ProcessOutput {
                status,
                stdout: collect_stream(stdout).await,
                stderr: collect_stream(stderr).await,
                elapsed,
            })
        }
        Ok(Err(source)) => {
            reclaim(&mut child, &program).await;
            collect_stream(stdout).await;
            collect_stream(stderr).await;
            Err(ProcessError::Wait { program, source })
        }
        Err(_) => {
            tracing::warn!(
                program = %program,
                limit_secs = limit.as_secs(),
                "Process exceeded time limit, killing"
            );
            reclaim(&mut child, &program).await;
            Err(ProcessError::TimedOut {
                program,
                limit,
                stdout: collect_stream(stdout).await,
                stderr: collect_stream(stderr).await,
            })
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        tracing::debug!("Stream read ended with error: {}", e);
    }
    buf
}

async fn collect_stream(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };

    match timeout(STREAM_GRACE, &mut handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            tracing::debug!("Stream reader task failed: {}", e);
            String::new()
        }
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

/// Kill the child (and its process group on unix) and reap it.
async fn reclaim(child: &mut Child, program: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        kill_group(pid, program);
    }

    if let Err(e) = child.kill().await {
        tracing::debug!(program = %program, "Kill after timeout reported: {}", e);
    }
}

/// Signal every process in the group led by `pid`.
///
/// The child was spawned with `process_group(0)`, so its pid is the group id.
#[cfg(unix)]
fn kill_group(pid: u32, program: &str) {
    let Ok(group) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; the group id comes
    // from a child this process spawned and has not yet reaped.
    let rc = unsafe { libc::killpg(group, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            program = %program,
            "Process group kill reported: {}",
            std::io::Error::last_os_error()
        );
    }
}
