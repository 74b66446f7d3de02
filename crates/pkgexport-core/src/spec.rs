//! Selection of the spec file to export from a packaging directory.

use crate::matcher::edit_distance;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("no spec file found in {}", .0.display())]
    NoSpecFound(PathBuf),
}

/// A spec file found in the packaging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecCandidate {
    pub file_name: String,
    /// File name without the `.spec` extension.
    pub name: String,
    pub path: PathBuf,
}

impl SpecCandidate {
    fn from_path(path: PathBuf) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_owned();
        let name = file_name
            .strip_suffix(".spec")
            .filter(|stem| !stem.is_empty())?
            .to_owned();
        Some(Self {
            file_name,
            name,
            path,
        })
    }

    /// Directory holding the spec file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }
}

/// Regular `*.spec` files directly under `dir`, in directory-listing order.
/// A missing or unreadable directory yields no candidates.
pub fn list_candidates(dir: &Path) -> Vec<SpecCandidate> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| SpecCandidate::from_path(e.path()))
        .collect()
}

/// Pick the spec file in `packaging_dir` that best matches `desired_name`.
///
/// A sole candidate is returned as is; an exact stem match wins next. Then
/// candidates whose stem starts with `desired_name` are preferred, and the
/// closest by edit distance is chosen. Ties keep directory-listing order,
/// which depends on the platform and filesystem.
pub fn resolve_spec(
    packaging_dir: &Path,
    desired_name: &str,
) -> Result<SpecCandidate, SpecError> {
    let candidates = list_candidates(packaging_dir);
    select(candidates, desired_name)
        .ok_or_else(|| SpecError::NoSpecFound(packaging_dir.to_path_buf()))
}

/// Selection over an already listed candidate set, in listing order.
pub fn select(mut candidates: Vec<SpecCandidate>, desired_name: &str) -> Option<SpecCandidate> {
    if candidates.len() <= 1 {
        return candidates.pop();
    }
    if let Some(pos) = candidates.iter().position(|c| c.name == desired_name) {
        return Some(candidates.swap_remove(pos));
    }

    let (same_start, rest): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| c.name.starts_with(desired_name));
    let mut pool = if same_start.is_empty() {
        rest
    } else {
        same_start
    };
    // sort_by_cached_key is stable
    pool.sort_by_cached_key(|c| edit_distance(&c.name, desired_name));
    pool.into_iter().next()
}
