// SPDX-License-Identifier: MIT

//! Bounded, timed subprocess execution (§5): every external invocation
//! gets an upper timeout and a capped output buffer so a runaway child
//! cannot stall or exhaust the daemon.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout as tokio_timeout;

/// Output cap applied to both stdout and stderr independently (§5: 50 MiB).
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 50 * 1024 * 1024;

/// Default ceiling for ZFS subprocess invocations (§5).
pub const ZFS_COMMAND_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default ceiling for short shell-out commands that are not ZFS sends.
pub const SHELL_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, source: std::io::Error },
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("io error reading output of {program}: {source}")]
    Io { program: String, source: std::io::Error },
}

/// Captured result of a finished subprocess. `stdout`/`stderr` are capped
/// at the configured limit; bytes beyond it are discarded and `truncated`
/// records that fact per stream.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr: Vec<u8>,
    pub stderr_truncated: bool,
}

impl CommandOutput {
    pub fn stdout_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// First 2500 + last 2500 bytes, the shape the Supervisor records for
    /// a synthesized `WorkerCrash` (§4.4).
    pub fn stderr_excerpt(&self) -> String {
        truncate_excerpt(&self.stderr)
    }
}

pub fn truncate_excerpt(bytes: &[u8]) -> String {
    const HEAD: usize = 2500;
    const TAIL: usize = 2500;
    if bytes.len() <= HEAD + TAIL {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let head = String::from_utf8_lossy(&bytes[..HEAD]);
    let tail = String::from_utf8_lossy(&bytes[bytes.len() - TAIL..]);
    format!("{head}\n...[truncated]...\n{tail}")
}

/// Run `cmd` to completion, enforcing `timeout` and `output_limit`. The
/// program name is captured for error messages before `cmd` is consumed.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit: usize,
) -> Result<CommandOutput, SubprocessError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| SubprocessError::Spawn { program: program.clone(), source })?;
    #[allow(clippy::expect_used)]
    let stdout = child.stdout.take().expect("stdout was piped");
    #[allow(clippy::expect_used)]
    let stderr = child.stderr.take().expect("stderr was piped");

    let collect = async {
        let stdout_fut = read_capped(stdout, output_limit);
        let stderr_fut = read_capped(stderr, output_limit);
        let (stdout, stderr) = tokio::join!(stdout_fut, stderr_fut);
        let status = child.wait().await;
        (status, stdout, stderr)
    };

    match tokio_timeout(timeout, collect).await {
        Ok((status, (stdout, stdout_truncated), (stderr, stderr_truncated))) => {
            let status = status.map_err(|source| SubprocessError::Io { program: program.clone(), source })?;
            Ok(CommandOutput { status, stdout, stdout_truncated, stderr, stderr_truncated })
        }
        Err(_elapsed) => {
            kill_child(&mut child, &program).await;
            Err(SubprocessError::Timeout { program, timeout })
        }
    }
}

async fn read_capped(mut reader: impl tokio::io::AsyncRead + Unpin, limit: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    let mut truncated = false;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < limit {
                    let take = (limit - buf.len()).min(n);
                    buf.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (buf, truncated)
}

async fn kill_child(child: &mut Child, program: &str) {
    if let Err(error) = child.start_kill() {
        tracing::warn!(program, %error, "failed to kill timed-out subprocess");
    }
    let _ = child.wait().await;
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
