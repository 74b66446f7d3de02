//! One-shot isolated execution of an export task.
//!
//! The task runs in a forked child that first assumes the target identity.
//! The child never returns to the caller: it serializes a [`ChildReport`]
//! over a socket pair and leaves with `_exit`, so no destructors or buffered
//! state of the parent run twice. The parent reads the report, reaps the
//! child and classifies whatever happened.

use crate::identity::{switch_identity, TargetIdentity};
use crate::tool::{error_chain, ToolError};
use crate::RuntimeError;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::backtrace::Backtrace;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The tool's own, recognised failure.
    Export,
    /// The child could not assume the target identity.
    Identity,
    /// Anything else: internal tool errors, panics, abnormal exits.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChildReport {
    Completed,
    Failed {
        category: FailureCategory,
        message: String,
        trace: Option<String>,
    },
}

impl ChildReport {
    pub fn failed(
        category: FailureCategory,
        message: impl Into<String>,
        trace: Option<String>,
    ) -> Self {
        Self::Failed {
            category,
            message: message.into(),
            trace,
        }
    }

    pub fn from_tool_result(result: Result<(), ToolError>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(e) if e.is_export_failure() => {
                Self::failed(FailureCategory::Export, e.to_string(), None)
            }
            Err(e) => Self::failed(
                FailureCategory::Internal,
                e.to_string(),
                Some(error_chain(&e)),
            ),
        }
    }
}

/// Backtrace captured by the child's panic hook, picked up after unwinding.
static PANIC_TRACE: Mutex<Option<String>> = Mutex::new(None);

enum ReadError {
    TimedOut,
    Io(io::Error),
}

/// Run `task` once in a forked child under `identity`.
///
/// Returns the child's report. A child that dies without reporting yields an
/// `Internal` failure carrying its wait status. Errors are reserved for the
/// isolation machinery itself (socket, fork, reading the report) and for
/// `timeout`, after which the child is killed.
pub fn run_isolated<F>(
    identity: &TargetIdentity,
    timeout: Option<Duration>,
    task: F,
) -> Result<ChildReport, RuntimeError>
where
    F: FnOnce() -> Result<(), ToolError>,
{
    let (mut parent_end, child_end) = UnixStream::pair()
        .map_err(|e| RuntimeError::Isolation(format!("cannot create report channel: {e}")))?;

    // SAFETY: the child only runs `child_main` and then calls `_exit`; it never
    // returns into the caller's stack frames or runs the parent's destructors.
    #[allow(unsafe_code)]
    let forked = unsafe { fork() };
    match forked.map_err(|e| RuntimeError::Isolation(format!("fork failed: {e}")))? {
        ForkResult::Child => {
            drop(parent_end);
            let report = child_main(identity, task);
            exit_child(i32::from(send_report(child_end, &report).is_err()))
        }
        ForkResult::Parent { child } => {
            drop(child_end);
            debug!("isolated export running as pid {child}");
            let deadline = timeout.map(|t| Instant::now() + t);
            match read_report(&mut parent_end, deadline) {
                Ok(bytes) => {
                    let status = waitpid(child, None).map_err(|e| {
                        RuntimeError::Isolation(format!("waitpid failed: {e}"))
                    })?;
                    debug!("export child finished: {status:?}");
                    interpret(&bytes, status)
                }
                Err(ReadError::TimedOut) => {
                    warn!("export child {child} timed out, killing it");
                    terminate(child);
                    Err(RuntimeError::Timeout(timeout.unwrap_or_default()))
                }
                Err(ReadError::Io(e)) => {
                    terminate(child);
                    Err(RuntimeError::Isolation(format!(
                        "cannot read export report: {e}"
                    )))
                }
            }
        }
    }
}

fn child_main<F>(identity: &TargetIdentity, task: F) -> ChildReport
where
    F: FnOnce() -> Result<(), ToolError>,
{
    if let Err(e) = switch_identity(identity) {
        return ChildReport::failed(
            FailureCategory::Identity,
            format!("cannot switch to {identity}: {e}"),
            None,
        );
    }

    panic::set_hook(Box::new(|info| {
        let trace = format!("{info}\n\nstack backtrace:\n{}", Backtrace::force_capture());
        if let Ok(mut slot) = PANIC_TRACE.lock() {
            *slot = Some(trace);
        }
    }));

    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(result) => ChildReport::from_tool_result(result),
        Err(payload) => {
            let trace = PANIC_TRACE.lock().ok().and_then(|mut slot| slot.take());
            ChildReport::failed(
                FailureCategory::Internal,
                format!("export tool panicked: {}", panic_message(payload.as_ref())),
                trace,
            )
        }
    }
}

/// Leave the forked child without unwinding or running exit handlers.
#[allow(unsafe_code)]
fn exit_child(code: i32) -> ! {
    // SAFETY: _exit has no preconditions; it terminates the calling process.
    unsafe { libc::_exit(code) }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

fn send_report(mut stream: UnixStream, report: &ChildReport) -> io::Result<()> {
    let bytes = serde_json::to_vec(report).map_err(io::Error::other)?;
    stream.write_all(&bytes)?;
    stream.flush()
}

fn read_report(
    stream: &mut UnixStream,
    deadline: Option<Instant>,
) -> Result<Vec<u8>, ReadError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ReadError::TimedOut);
            }
            stream.set_read_timeout(Some(remaining)).map_err(ReadError::Io)?;
        }
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(buf),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e)
                if deadline.is_some()
                    && matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => return Err(ReadError::Io(e)),
        }
    }
}

fn interpret(bytes: &[u8], status: WaitStatus) -> Result<ChildReport, RuntimeError> {
    if bytes.is_empty() {
        return Ok(ChildReport::failed(
            FailureCategory::Internal,
            "export process ended without a report",
            Some(describe_status(status)),
        ));
    }
    serde_json::from_slice(bytes)
        .map_err(|e| RuntimeError::Isolation(format!("malformed export report: {e}")))
}

fn describe_status(status: WaitStatus) -> String {
    match status {
        WaitStatus::Exited(pid, code) => format!("process {pid} exited with status {code}"),
        WaitStatus::Signaled(pid, signal, core) => format!(
            "process {pid} killed by signal {}{}",
            signal.as_str(),
            if core { " (core dumped)" } else { "" }
        ),
        other => format!("process ended unexpectedly: {other:?}"),
    }
}

fn terminate(child: Pid) {
    if let Err(e) = kill(child, Signal::SIGKILL) {
        debug!("SIGKILL to {child} failed: {e}");
    }
    if let Err(e) = waitpid(child, None) {
        warn!("failed to reap export child {child}: {e}");
    }
}
