//! Repository cache for pkgexport.
//!
//! Keeps one reusable local clone per repository URL under a cache root,
//! serialises concurrent runs against the same URL with an exclusive file
//! lock, and checks out a requested revision as a detached working copy.
//! The `RepositoryCache` trait is the seam the export orchestrator consumes;
//! `GitRepoCache` is the git-backed implementation.

pub mod git;
pub mod layout;
pub mod lock;
pub mod repo;

pub use layout::CacheLayout;
pub use lock::RepoLock;
pub use repo::GitRepoCache;

use pkgexport_schema::{CommitId, CommitInfo};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to lock repository cache {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("git is not available: {0}")]
    GitUnavailable(String),
    #[error("git {op} failed: {stderr}")]
    Git { op: String, stderr: String },
    #[error("unknown revision '{0}'")]
    UnknownRevision(String),
    #[error("unexpected git output: {0}")]
    BadOutput(String),
}

/// A checked-out snapshot of a repository at one commit.
///
/// Holds the per-URL cache lock for as long as it is alive, so the tree
/// cannot be switched to another revision underneath the export.
#[derive(Debug)]
pub struct WorkingCopy {
    url: String,
    path: PathBuf,
    commit: CommitId,
    info: CommitInfo,
    _lock: Option<RepoLock>,
}

impl WorkingCopy {
    pub fn new(
        url: impl Into<String>,
        path: impl Into<PathBuf>,
        commit: CommitId,
        info: CommitInfo,
        lock: Option<RepoLock>,
    ) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            commit,
            info,
            _lock: lock,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(&self) -> &CommitId {
        &self.commit
    }

    pub fn info(&self) -> &CommitInfo {
        &self.info
    }
}

/// Source of working copies, keyed by repository URL.
pub trait RepositoryCache: Send + Sync {
    /// Update the cached clone of `url` and check out `revision`.
    fn working_copy(&self, url: &str, revision: &str) -> Result<WorkingCopy, CacheError>;
}
