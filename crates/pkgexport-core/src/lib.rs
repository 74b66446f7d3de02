//! Core orchestration for pkgexport.
//!
//! This crate ties together the repository cache, spec selection and the
//! isolated export tool into the `Engine`, which drives one export run
//! through its state machine and maps every failure to an exit code exactly
//! once. It also provides the edit-distance matcher used to pick a spec file,
//! the in-memory run log, and the error package fallback.

pub mod engine;
pub mod errpkg;
pub mod exporter;
pub mod lifecycle;
pub mod matcher;
pub mod runlog;
pub mod spec;

pub use engine::{Engine, RunReport};
pub use errpkg::{maybe_synthesize, ERROR_LOG_FILE, ERROR_SPEC_FILE};
pub use exporter::{ExportOutcome, Exporter};
pub use lifecycle::{validate_transition, RunState};
pub use matcher::edit_distance;
pub use runlog::RunLog;
pub use spec::{resolve_spec, SpecCandidate, SpecError};

use std::path::PathBuf;
use thiserror::Error;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_SERVICE_ERROR: u8 = 1;
pub const EXIT_EXPORT_ERROR: u8 = 2;
pub const EXIT_EXPORT_CRASH: u8 = 3;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    Request(#[from] pkgexport_schema::RequestError),
    #[error("repository cache: {0}")]
    Cache(#[from] pkgexport_cache::CacheError),
    #[error("runtime error: {0}")]
    Runtime(#[from] pkgexport_runtime::RuntimeError),
    #[error("failed to create output directory {}: {source}", path.display())]
    Outdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("export setup failed: {0}")]
    ExportSetup(String),
    #[error("export failed: {0}")]
    ExportFailed(String),
    #[error("export crashed: {message}")]
    ExportCrashed {
        message: String,
        trace: Option<String>,
    },
    #[error("failed to write revision metadata {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Spec(_) | Self::ExportFailed(_) => EXIT_EXPORT_ERROR,
            Self::ExportCrashed { .. } => EXIT_EXPORT_CRASH,
            _ => EXIT_SERVICE_ERROR,
        }
    }
}
