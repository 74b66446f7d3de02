//! Thin wrapper around the `git` command line.

use crate::CacheError;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Longest stderr excerpt carried in an error message.
const STDERR_LIMIT: usize = 2000;

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run `git <args>` in `dir` and return its trimmed stdout.
pub fn run<I, S>(dir: &Path, op: &str, args: I) -> Result<String, CacheError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new("git");
    cmd.current_dir(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C");
    debug!("git {op} in {}", dir.display());

    let output = cmd.output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            CacheError::GitUnavailable(e.to_string())
        } else {
            CacheError::Io(e)
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CacheError::Git {
            op: op.to_owned(),
            stderr: truncate(stderr.trim(), STDERR_LIMIT),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

/// Like [`run`], but a non-zero exit yields `Ok(None)` instead of an error.
pub fn try_run<I, S>(dir: &Path, op: &str, args: I) -> Result<Option<String>, CacheError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    match run(dir, op, args) {
        Ok(out) => Ok(Some(out)),
        Err(CacheError::Git { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_owned();
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
