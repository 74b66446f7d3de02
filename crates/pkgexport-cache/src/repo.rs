use crate::git;
use crate::layout::CacheLayout;
use crate::lock::RepoLock;
use crate::{CacheError, RepositoryCache, WorkingCopy};
use pkgexport_schema::{CommitId, CommitInfo, DEFAULT_REVISION};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Git-backed repository cache rooted at a single directory.
#[derive(Debug, Clone)]
pub struct GitRepoCache {
    layout: CacheLayout,
}

impl GitRepoCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: CacheLayout::new(root),
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    fn clone_repo(&self, url: &str, repo_dir: &Path) -> Result<(), CacheError> {
        if repo_dir.exists() {
            warn!("removing incomplete cache entry {}", repo_dir.display());
            fs::remove_dir_all(repo_dir)?;
        }
        info!("cloning {url}");
        let result = git::run(
            self.layout.root(),
            "clone",
            [
                OsStr::new("clone"),
                OsStr::new("--no-checkout"),
                OsStr::new("--quiet"),
                OsStr::new("--"),
                OsStr::new(url),
                repo_dir.as_os_str(),
            ],
        );
        if result.is_err() && repo_dir.exists() {
            let _ = fs::remove_dir_all(repo_dir);
        }
        result.map(drop)
    }

    fn fetch(url: &str, repo_dir: &Path) -> Result<(), CacheError> {
        info!("updating cached clone of {url}");
        git::run(repo_dir, "remote set-url", ["remote", "set-url", "origin", url])?;
        git::run(
            repo_dir,
            "fetch",
            [
                "fetch",
                "--quiet",
                "--force",
                "--tags",
                "--prune",
                "origin",
                "+refs/heads/*:refs/remotes/origin/*",
            ],
        )?;
        // The remote default branch may have moved; a missing remote HEAD is not fatal.
        let _ = git::try_run(
            repo_dir,
            "remote set-head",
            ["remote", "set-head", "origin", "--auto"],
        )?;
        Ok(())
    }

    /// Resolve `revision` to a commit, preferring remote-tracking refs over
    /// the stale local branches left by the initial clone.
    fn resolve_revision(repo_dir: &Path, revision: &str) -> Result<CommitId, CacheError> {
        let candidates: Vec<String> = if revision == DEFAULT_REVISION {
            vec!["refs/remotes/origin/HEAD".to_owned(), revision.to_owned()]
        } else {
            vec![
                format!("refs/remotes/origin/{revision}"),
                format!("refs/tags/{revision}"),
                revision.to_owned(),
            ]
        };

        for candidate in candidates {
            let spec = format!("{candidate}^{{commit}}");
            if let Some(sha) = git::try_run(
                repo_dir,
                "rev-parse",
                ["rev-parse", "--verify", "--quiet", spec.as_str()],
            )? {
                if sha.is_empty() {
                    return Err(CacheError::BadOutput(format!(
                        "empty rev-parse output for '{candidate}'"
                    )));
                }
                debug!("revision '{revision}' resolved via {candidate} to {sha}");
                return Ok(CommitId::new(sha));
            }
        }
        Err(CacheError::UnknownRevision(revision.to_owned()))
    }

    fn checkout(repo_dir: &Path, commit: &CommitId) -> Result<(), CacheError> {
        git::run(
            repo_dir,
            "checkout",
            ["checkout", "--quiet", "--force", "--detach", commit.as_str()],
        )?;
        git::run(repo_dir, "clean", ["clean", "-ffdxq"])?;
        Ok(())
    }

    fn commit_info(repo_dir: &Path, commit: &CommitId) -> Result<CommitInfo, CacheError> {
        let out = git::run(
            repo_dir,
            "show",
            [
                "show",
                "-s",
                "--format=%an%x00%ae%x00%cI%x00%s",
                commit.as_str(),
            ],
        )?;
        let mut fields = out.splitn(4, '\0');
        let mut next = || fields.next().map(str::to_owned);
        match (next(), next(), next(), next()) {
            (Some(author), Some(author_email), Some(committer_date), Some(subject)) => {
                Ok(CommitInfo {
                    author,
                    author_email,
                    committer_date,
                    subject,
                })
            }
            _ => Err(CacheError::BadOutput(format!(
                "cannot parse commit info for {commit}"
            ))),
        }
    }
}

impl RepositoryCache for GitRepoCache {
    fn working_copy(&self, url: &str, revision: &str) -> Result<WorkingCopy, CacheError> {
        self.layout.initialize()?;
        let repo_dir = self.layout.repo_dir(url);
        let lock = RepoLock::acquire(&self.layout.lock_file(url))?;

        if repo_dir.join(".git").is_dir() {
            Self::fetch(url, &repo_dir)?;
        } else {
            self.clone_repo(url, &repo_dir)?;
        }

        let commit = Self::resolve_revision(&repo_dir, revision)?;
        Self::checkout(&repo_dir, &commit)?;
        let info = Self::commit_info(&repo_dir, &commit)?;
        info!("working copy at {} ({})", commit.short(), info.subject);

        Ok(WorkingCopy::new(url, repo_dir, commit, info, Some(lock)))
    }
}
