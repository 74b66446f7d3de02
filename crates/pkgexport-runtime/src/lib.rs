//! Export tool backends and process isolation for pkgexport.
//!
//! This crate implements the execution layer: the pluggable `ExportTool` trait
//! with a native exporter, a `gbs export` wrapper and a mock tool, resolution
//! of the configured OS identity, and `run_isolated`, which runs one export in
//! a forked child under that identity and relays its outcome back to the
//! parent as a serialized report.

pub mod archive;
pub mod gbs;
pub mod identity;
pub mod isolate;
pub mod mock;
pub mod native;
pub mod prereq;
pub mod specfile;
pub mod tool;

pub use identity::{resolve_identity, switch_identity, TargetIdentity};
pub use isolate::{run_isolated, ChildReport, FailureCategory};
pub use prereq::{check_tool_prereqs, format_missing, MissingPrereq};
pub use tool::{select_tool, ExportJob, ExportTool, ToolError};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export tool '{0}' is not available on this system")]
    ToolUnavailable(String),
    #[error("unknown user '{0}'")]
    UnknownUser(String),
    #[error("unknown group '{0}'")]
    UnknownGroup(String),
    #[error("identity lookup failed: {0}")]
    Identity(String),
    #[error("cannot start isolated export: {0}")]
    Isolation(String),
    #[error("export did not finish within {}s", .0.as_secs())]
    Timeout(Duration),
}
