use crate::types::RevisionSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_REVISION: &str = "HEAD";
pub const DEFAULT_PACKAGING_DIR: &str = "packaging";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("repository URL must not be empty")]
    EmptyUrl,
    #[error("output directory must be an absolute path: {0}")]
    RelativeOutdir(PathBuf),
    #[error("invalid exit code '{0}' in error-package list")]
    InvalidExitCode(String),
    #[error("cannot derive a package name from URL '{0}'")]
    NoPackageName(String),
    #[error("{what} must be a relative path inside its parent: '{path}'")]
    EscapingPath { what: &'static str, path: PathBuf },
}

/// OS identity the export tool runs under. `None` keeps the caller's id.
///
/// Values are user/group names or numeric ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

impl IdentityConfig {
    pub fn new(user: Option<String>, group: Option<String>) -> Self {
        Self { user, group }
    }

    pub fn is_unchanged(&self) -> bool {
        self.user.is_none() && self.group.is_none()
    }
}

/// One export run, as requested by the caller. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub url: String,
    pub revision: RevisionSpec,
    pub outdir: PathBuf,
    /// Explicit spec file name; defaults to the repository name.
    pub spec: Option<String>,
    /// Packaging directory, relative to the repository root.
    pub packaging_dir: PathBuf,
    pub verbose: bool,
    pub identity: IdentityConfig,
    /// Exit codes that are turned into an error package instead of a failure.
    pub error_pkg: BTreeSet<u8>,
    /// Revision metadata file, relative to `outdir`.
    pub git_meta: Option<PathBuf>,
}

impl ExportRequest {
    pub fn new(url: impl Into<String>, outdir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            revision: RevisionSpec::new(DEFAULT_REVISION),
            outdir: outdir.into(),
            spec: None,
            packaging_dir: PathBuf::from(DEFAULT_PACKAGING_DIR),
            verbose: false,
            identity: IdentityConfig::default(),
            error_pkg: BTreeSet::new(),
            git_meta: None,
        }
    }

    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<RevisionSpec>) -> Self {
        self.revision = revision.into();
        self
    }

    #[must_use]
    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.spec = Some(spec.into());
        self
    }

    #[must_use]
    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = identity;
        self
    }

    #[must_use]
    pub fn with_error_pkg(mut self, codes: impl IntoIterator<Item = u8>) -> Self {
        self.error_pkg = codes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_git_meta(mut self, name: impl Into<PathBuf>) -> Self {
        self.git_meta = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.url.trim().is_empty() {
            return Err(RequestError::EmptyUrl);
        }
        if !self.outdir.is_absolute() {
            return Err(RequestError::RelativeOutdir(self.outdir.clone()));
        }
        ensure_contained("packaging directory", &self.packaging_dir)?;
        if let Some(meta) = &self.git_meta {
            ensure_contained("metadata file", meta)?;
        }
        Ok(())
    }

    /// Name the spec resolver looks for: the explicit spec name without its
    /// extension, or the repository name derived from the URL.
    pub fn desired_spec_name(&self) -> Result<String, RequestError> {
        if let Some(spec) = &self.spec {
            let stem = spec.strip_suffix(".spec").unwrap_or(spec);
            return Ok(stem.to_owned());
        }
        default_spec_name(&self.url).ok_or_else(|| RequestError::NoPackageName(self.url.clone()))
    }
}

fn ensure_contained(what: &'static str, path: &Path) -> Result<(), RequestError> {
    let escapes = path.as_os_str().is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(RequestError::EscapingPath {
            what,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Repository name from its URL: the last path segment without a `.git` suffix.
///
/// Handles scp-style URLs (`host:group/repo.git`) and local paths.
pub fn default_spec_name(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(|c: char| c == '/' || c == ':').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_owned())
    }
}

/// Parse a comma-separated list of exit codes, e.g. `"1,2,3"`.
pub fn parse_exit_codes(input: &str) -> Result<BTreeSet<u8>, RequestError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u8>()
                .map_err(|_| RequestError::InvalidExitCode(s.to_owned()))
        })
        .collect()
}
