//! Fragment execution through an external interpreter.
//!
//! The fragment is piped to a configured command on stdin and runs under a
//! wall-clock timeout with bounded output capture. Output is read
//! concurrently while the child runs so a chatty fragment cannot deadlock
//! the pipes.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::exec::{Diagnostic, ExecFault, ExecRequest, ExecStrategy, Execution, FaultKind};

/// Environment prefix for call parameters passed to the interpreter.
pub const PARAM_ENV_PREFIX: &str = "SLOT_PARAM_";

/// Runs fragments through an interpreter command such as `["sh"]`.
///
/// Parameters are exported to the child as `SLOT_PARAM_<name>` environment
/// variables, scoped to that one process. stdout becomes the captured
/// output; stderr lines surface as warning diagnostics; non-zero exit,
/// spawn failure, and timeout surface as faults.
pub struct ProcessStrategy {
    command: Vec<String>,
}

impl ProcessStrategy {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl ExecStrategy for ProcessStrategy {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn execute(&self, request: &ExecRequest<'_>) -> Execution {
        let Some((program, args)) = self.command.split_first() else {
            return Execution::faulted(FaultKind::Spawn, "interpreter command is empty");
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        for (key, value) in request.params {
            cmd.env(format!("{PARAM_ENV_PREFIX}{key}"), value);
        }

        let captured = match run_interpreter(
            cmd,
            request.source.as_bytes(),
            request.timeout,
            request.output_limit_bytes,
        ) {
            Ok(captured) => captured,
            Err(err) => return Execution::faulted(FaultKind::Spawn, format!("{err:#}")),
        };

        let mut execution = Execution {
            output: String::from_utf8_lossy(&captured.stdout).into_owned(),
            ..Execution::default()
        };
        for line in String::from_utf8_lossy(&captured.stderr).lines() {
            if !line.trim().is_empty() {
                execution.diagnostics.push(Diagnostic::warning(line));
            }
        }
        if captured.stdout_truncated > 0 {
            execution.diagnostics.push(Diagnostic::warning(format!(
                "stdout truncated {} bytes",
                captured.stdout_truncated
            )));
        }
        if captured.stderr_truncated > 0 {
            execution.diagnostics.push(Diagnostic::warning(format!(
                "stderr truncated {} bytes",
                captured.stderr_truncated
            )));
        }

        if captured.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "interpreter timed out");
            execution.fault = Some(ExecFault {
                kind: FaultKind::Timeout,
                message: format!("interpreter timed out after {:?}", request.timeout),
            });
            return execution;
        }
        if !captured.status.success() {
            let message = match captured.status.code() {
                Some(code) => format!("interpreter exited with status {code}"),
                None => "interpreter terminated by signal".to_string(),
            };
            warn!(exit_code = ?captured.status.code(), "interpreter failed");
            execution.fault = Some(ExecFault {
                kind: FaultKind::Exit,
                message,
            });
            return execution;
        }

        debug!(bytes = execution.output.len(), "interpreter finished");
        execution
    }
}

/// Captured child process output.
#[derive(Debug)]
struct CapturedProcess {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stdout_truncated: usize,
    stderr_truncated: usize,
    timed_out: bool,
}

/// Pipe `source` to the child and capture stdout/stderr without risking
/// pipe deadlocks. `limit` bounds the bytes kept per stream; the pipes are
/// still drained beyond it. On timeout the child is killed and reaped.
fn run_interpreter(
    mut cmd: Command,
    source: &[u8],
    timeout: Duration,
    limit: usize,
) -> Result<CapturedProcess> {
    use wait_timeout::ChildExt;

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning interpreter");
    let mut child = cmd.spawn().context("spawn interpreter")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_limited(stderr, limit));

    {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // A fragment that exits early may close stdin before the write
        // completes; that is not a launch failure.
        match child_stdin.write_all(source) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {}
            Err(err) => return Err(err).context("write fragment to stdin"),
        }
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for interpreter")? {
        Some(status) => status,
        None => {
            timed_out = true;
            child.kill().context("kill interpreter")?;
            child.wait().context("wait interpreter after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_reader(stderr_handle).context("join stderr")?;

    Ok(CapturedProcess {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes.
fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
