use pkgexport_schema::default_spec_name;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout of the repository cache.
///
/// Every URL gets its own clone directory and lock file directly under the
/// root. Names combine a readable repository name with a blake3 digest of
/// the full URL, so different URLs never share a clone.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_name(url: &str) -> String {
        let name: String = default_spec_name(url)
            .unwrap_or_else(|| "repo".to_owned())
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let digest = blake3::hash(url.trim().as_bytes()).to_hex();
        format!("{name}-{}", &digest.as_str()[..16])
    }

    #[inline]
    pub fn repo_dir(&self, url: &str) -> PathBuf {
        self.root.join(Self::entry_name(url))
    }

    #[inline]
    pub fn lock_file(&self, url: &str) -> PathBuf {
        self.root.join(format!("{}.lock", Self::entry_name(url)))
    }

    pub fn initialize(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.root)
    }
}
