use crate::types::{CommitId, RevisionSpec};
use serde::{Deserialize, Serialize};

/// Descriptive fields of a single commit, as reported by the repository cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub author: String,
    pub author_email: String,
    /// Committer date, ISO 8601.
    pub committer_date: String,
    pub subject: String,
}

/// Revision metadata written next to the exported files on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMeta {
    pub url: String,
    pub revision: RevisionSpec,
    pub commit: CommitId,
    #[serde(flatten)]
    pub info: CommitInfo,
    pub exported_at: String,
}

impl RevisionMeta {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }
}
