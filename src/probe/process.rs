//! Blocking subprocess execution with a hard timeout.
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

use crate::error::{VerifierError, VerifierResult};
use crate::util::truncate_string;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_STDERR_BYTES: usize = 512;

#[derive(Debug)]
pub struct CapturedOutput {
    pub program: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Fail with [`VerifierError::Exited`] unless the command exited zero.
    pub fn into_success(self) -> VerifierResult<Self> {
        if self.status.success() {
            return Ok(self);
        }
        let detail = self.stderr.trim();
        let status = if detail.is_empty() {
            exit_status_string(&self.status)
        } else {
            format!(
                "{} ({})",
                exit_status_string(&self.status),
                truncate_string(detail, MAX_STDERR_BYTES)
            )
        };
        Err(VerifierError::Exited {
            program: self.program,
            status,
        })
    }
}

/// Run `command` to completion, killing it once `timeout` elapses.
///
/// Output pipes are drained on helper threads so a chatty child cannot block
/// on a full pipe while we wait on it. The deadline also bounds reading the
/// pipes, which a backgrounded grandchild can hold open after the child
/// exits. The exit status is returned as-is; see
/// [`CapturedOutput::into_success`].
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> VerifierResult<CapturedOutput> {
    let program = command.get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let deadline = Instant::now() + timeout;
    let mut child = command.spawn().map_err(|source| VerifierError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(%program, ?timeout, "subprocess timed out");
            return Err(VerifierError::TimedOut { program, timeout });
        }
        Err(source) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(VerifierError::Spawn { program, source });
        }
    };

    let (Some(stdout), Some(stderr)) = (collect(stdout, deadline), collect(stderr, deadline))
    else {
        tracing::warn!(%program, ?timeout, "subprocess output still open at deadline");
        return Err(VerifierError::TimedOut { program, timeout });
    };
    Ok(CapturedOutput {
        program,
        status,
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Wait for a drained pipe until `deadline`; `None` once it has passed.
fn collect(pipe: Option<mpsc::Receiver<Vec<u8>>>, deadline: Instant) -> Option<String> {
    let Some(rx) = pipe else {
        return Some(String::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

fn exit_status_string(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        format!("exit code {code}")
    } else {
        "termination by signal".to_string()
    }
}
