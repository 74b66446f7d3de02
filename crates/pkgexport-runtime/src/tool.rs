use crate::RuntimeError;
use pkgexport_schema::CommitId;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Everything an export tool needs for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportJob {
    /// Scratch directory; the tool creates exactly one subdirectory here.
    pub outdir: PathBuf,
    /// Checked-out source tree.
    pub source_dir: PathBuf,
    pub commit: CommitId,
    /// Absolute path of the chosen spec file.
    pub spec_path: PathBuf,
    /// Absolute path of the packaging directory holding `spec_path`.
    pub packaging_dir: PathBuf,
    pub verbose: bool,
}

impl ExportJob {
    pub fn spec_file_name(&self) -> &str {
        self.spec_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn spec_stem(&self) -> &str {
        self.spec_path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Packaging directory relative to the source tree, when it lies inside it.
    pub fn relative_packaging_dir(&self) -> &Path {
        self.packaging_dir
            .strip_prefix(&self.source_dir)
            .unwrap_or(&self.packaging_dir)
    }
}

/// Failure reported by an export tool.
///
/// `Export` is the tool's own, recognised failure (bad spec, rejected
/// revision, non-zero `gbs` status). Everything else is treated as an
/// internal fault of the tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Export(String),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_export_failure(&self) -> bool {
        matches!(self, Self::Export(_))
    }
}

/// Render an error and its `source()` chain, one cause per line.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(out, "\ncaused by: {cause}");
        source = cause.source();
    }
    out
}

pub trait ExportTool: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Write the exported artifacts for `job` into a single new subdirectory
    /// of `job.outdir`. Called once, inside the isolated child.
    fn export(&self, job: &ExportJob) -> Result<(), ToolError>;
}

pub fn select_tool(name: &str) -> Result<Box<dyn ExportTool>, RuntimeError> {
    match name {
        "native" => Ok(Box::new(crate::native::NativeTool::new())),
        "gbs" => Ok(Box::new(crate::gbs::GbsTool::new())),
        "mock" => Ok(Box::new(crate::mock::MockTool::new())),
        other => Err(RuntimeError::ToolUnavailable(other.to_owned())),
    }
}
