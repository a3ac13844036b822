// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::CollectError;
use crate::parser::{LineBuffer, MAX_LINE_BYTES};
use crate::sink::Sink;
use log::{debug, warn};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::{Duration, Instant, timeout_at};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Only this much of a command's stderr is kept for error reports.
pub const MAX_STDERR_BYTES: usize = 4 * 1024;

/// How long stderr may stay open after a failed command has exited.
const STDERR_GRACE: Duration = Duration::from_millis(250);

/// An external command line: program plus arguments, no shell involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from an argv list; `None` when the list is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub stdout_bytes: u64,
    pub status: ExitStatus,
}

/// Spawn `spec` and hand its stdout to `on_chunk` as it arrives.
///
/// The whole run, including waiting for exit and collecting stderr, ends by
/// `deadline`; on expiry the child is killed. Output already handed to
/// `on_chunk` stays handed over whatever the outcome, so callers keep partial
/// results from a command that later fails.
pub async fn run_streaming(
    spec: &CommandSpec,
    deadline: Instant,
    mut on_chunk: impl FnMut(&[u8]),
) -> Result<RunSummary, CollectError> {
    let budget = deadline.saturating_duration_since(Instant::now());
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| CollectError::Launch {
        command: spec.to_string(),
        source,
    })?;
    debug!(
        "[{}] spawned (pid={})",
        spec.program,
        child.id().unwrap_or(0)
    );

    let (Some(mut stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.start_kill();
        return Err(CollectError::Read {
            command: spec.to_string(),
            source: std::io::Error::other("child pipes were not captured"),
        });
    };
    // Drained concurrently so a chatty stderr cannot fill its pipe and stall
    // the child while we are blocked on stdout.
    let mut stderr_task = tokio::spawn(read_capped(stderr, MAX_STDERR_BYTES));

    let read_all = async {
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        let mut stdout_bytes = 0u64;
        loop {
            let n = stdout
                .read(&mut buf)
                .await
                .map_err(|source| CollectError::Read {
                    command: spec.to_string(),
                    source,
                })?;
            let Some(chunk) = buf.get(..n).filter(|chunk| !chunk.is_empty()) else {
                break;
            };
            on_chunk(chunk);
            stdout_bytes += n as u64;
        }
        let status = child.wait().await.map_err(|source| CollectError::Read {
            command: spec.to_string(),
            source,
        })?;
        Ok(RunSummary {
            stdout_bytes,
            status,
        })
    };
    let outcome = timeout_at(deadline, read_all).await;

    let summary = match outcome {
        Ok(result) => result?,
        Err(_) => {
            warn!(
                "[{}] still running after {}s, killing it",
                spec.program,
                budget.as_secs_f64()
            );
            if let Err(e) = child.start_kill() {
                warn!("[{}] failed to kill: {e}", spec.program);
            }
            let _ = child.wait().await;
            stderr_task.abort();
            return Err(CollectError::Timeout {
                command: spec.to_string(),
                timeout: budget,
            });
        }
    };

    if !summary.status.success() {
        // A grandchild may still hold stderr open after the child exits.
        let stderr_deadline = deadline.min(Instant::now() + STDERR_GRACE);
        let stderr = match timeout_at(stderr_deadline, &mut stderr_task).await {
            Ok(Ok(stderr)) => stderr,
            _ => {
                stderr_task.abort();
                Vec::new()
            }
        };
        return Err(CollectError::Exit {
            command: spec.to_string(),
            status: summary.status,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    debug!(
        "[{}] exited with {} after {} byte(s) of output",
        spec.program, summary.status, summary.stdout_bytes
    );
    Ok(summary)
}

/// Read `reader` to the end, keeping at most `cap` bytes.
async fn read_capped(mut reader: impl AsyncRead + Unpin, cap: usize) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                if let Some(part) = buf.get(..n.min(room)) {
                    kept.extend_from_slice(part);
                }
            }
        }
    }
    kept
}

/// The node-wide metrics command whose stdout is already in the shipped line
/// format and only needs forwarding.
#[derive(Debug, Clone)]
pub struct FleetCommand {
    spec: CommandSpec,
    limit: Duration,
}

impl FleetCommand {
    pub fn new(spec: CommandSpec, limit: Duration) -> Self {
        Self { spec, limit }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Run once, shipping every output line to `sink`. Returns the number
    /// of lines shipped.
    pub async fn run(&self, sink: &dyn Sink) -> Result<u64, CollectError> {
        let mut lines = LineBuffer::new();
        let mut shipped = 0u64;
        let deadline = Instant::now() + self.limit;
        let result = run_streaming(&self.spec, deadline, |chunk| {
            lines.push(chunk, |line| {
                sink.ship_line(&String::from_utf8_lossy(line));
                shipped += 1;
            });
        })
        .await;

        // A final line without a newline is a complete record only when the
        // command ran to a clean exit; otherwise it may be cut mid-value.
        if result.is_ok() && !lines.pending().is_empty() {
            sink.ship_line(&String::from_utf8_lossy(lines.pending()));
            shipped += 1;
        } else if !lines.pending().is_empty() {
            debug!(
                "[{}] discarding {} byte(s) of unterminated output",
                self.spec.program,
                lines.pending().len()
            );
        }
        lines.finish();
        if lines.overlong_lines() > 0 {
            debug!(
                "[{}] dropped {} line(s) longer than {MAX_LINE_BYTES} bytes",
                self.spec.program,
                lines.overlong_lines()
            );
        }

        result.map(|_| shipped)
    }
}
