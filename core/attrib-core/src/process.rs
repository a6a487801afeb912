//! Bounded external process execution.
//!
//! Every collaborator binary (`git-ai`, `git`) runs through [`run_with_timeout`]
//! so a hung child can never hold the caller longer than its budget.

use crate::error::{AttribError, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL_MS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Human-readable command line for logs and errors.
pub fn describe(program: &Path, args: &[String]) -> String {
    let mut parts = vec![program.display().to_string()];
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

/// Runs `program` in `cwd`, killing it once `timeout` elapses.
pub fn run_with_timeout(
    program: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput> {
    run_bounded(program, args, cwd, Instant::now() + timeout, timeout)
}

/// Like [`run_with_timeout`], but against an absolute deadline so several
/// commands can share one budget. A deadline already in the past fails
/// without spawning.
pub fn run_until(
    program: &Path,
    args: &[String],
    cwd: &Path,
    deadline: Instant,
) -> Result<CommandOutput> {
    let budget = deadline.saturating_duration_since(Instant::now());
    run_bounded(program, args, cwd, deadline, budget)
}

fn run_bounded(
    program: &Path,
    args: &[String],
    cwd: &Path,
    deadline: Instant,
    budget: Duration,
) -> Result<CommandOutput> {
    let command_line = describe(program, args);
    if budget.is_zero() || Instant::now() >= deadline {
        return Err(AttribError::CommandTimedOut {
            command: command_line,
            timeout_ms: 0,
        });
    }

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AttribError::CommandFailed {
            command: command_line.clone(),
            details: format!("failed to spawn: {}", err),
        })?;

    // Pipes are drained while the child runs; a full pipe would otherwise
    // block the child until the deadline.
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    // Readers are detached: a grandchild may still hold the
                    // pipes open.
                    return Err(AttribError::CommandTimedOut {
                        command: command_line,
                        timeout_ms: budget.as_millis() as u64,
                    });
                }
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AttribError::Io {
                    context: format!("waiting for {}", command_line),
                    source: err,
                });
            }
        }
    };

    Ok(CommandOutput {
        success: status.success(),
        code: status.code(),
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
