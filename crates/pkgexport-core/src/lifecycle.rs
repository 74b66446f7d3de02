use crate::CoreError;
use std::fmt;

/// Stages of one export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    ConfigLoaded,
    RepoReady,
    OutdirReady,
    SpecResolved,
    Exported,
    MetadataWritten,
    Done,
    Failed,
    ErrorPackageEmitted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Init => "init",
            RunState::ConfigLoaded => "config-loaded",
            RunState::RepoReady => "repo-ready",
            RunState::OutdirReady => "outdir-ready",
            RunState::SpecResolved => "spec-resolved",
            RunState::Exported => "exported",
            RunState::MetadataWritten => "metadata-written",
            RunState::Done => "done",
            RunState::Failed => "failed",
            RunState::ErrorPackageEmitted => "error-package-emitted",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: RunState, to: RunState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (RunState::Init, RunState::ConfigLoaded)
            | (RunState::ConfigLoaded, RunState::RepoReady)
            | (RunState::RepoReady, RunState::OutdirReady)
            | (RunState::OutdirReady, RunState::SpecResolved)
            | (RunState::SpecResolved, RunState::Exported)
            | (RunState::Exported, RunState::MetadataWritten)
            | (
                RunState::MetadataWritten | RunState::ErrorPackageEmitted,
                RunState::Done
            )
            | (RunState::Failed, RunState::ErrorPackageEmitted)
    ) || (to == RunState::Failed && !matches!(from, RunState::Done | RunState::Failed));

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
