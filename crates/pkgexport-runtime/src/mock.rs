use crate::archive::{write_source_archive, ArchiveFormat};
use crate::tool::{ExportJob, ExportTool, ToolError};
use std::fs;

/// How a [`MockTool`] behaves when asked to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Write `<stem>-mock/<stem>.spec` and `<stem>-mock/<stem>-mock.tar`.
    Succeed,
    /// Return an export-category error with this message.
    Fail(String),
    /// Return an internal error with this message.
    Break(String),
    /// Panic with this message.
    Panic(String),
    /// Return success without writing anything.
    NoOutput,
}

pub struct MockTool {
    behavior: MockBehavior,
}

impl Default for MockTool {
    fn default() -> Self {
        Self {
            behavior: MockBehavior::Succeed,
        }
    }
}

impl MockTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self { behavior }
    }
}

impl ExportTool for MockTool {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn export(&self, job: &ExportJob) -> Result<(), ToolError> {
        match &self.behavior {
            MockBehavior::Succeed => {}
            MockBehavior::Fail(msg) => return Err(ToolError::Export(msg.clone())),
            MockBehavior::Break(msg) => return Err(ToolError::Internal(msg.clone())),
            MockBehavior::Panic(msg) => panic!("{msg}"),
            MockBehavior::NoOutput => return Ok(()),
        }

        let stem = job.spec_stem();
        let dir = job.outdir.join(format!("{stem}-mock"));
        fs::create_dir(&dir).map_err(|e| ToolError::io(&dir, e))?;
        let spec = dir.join(format!("{stem}.spec"));
        fs::copy(&job.spec_path, &spec).map_err(|e| ToolError::io(&job.spec_path, e))?;
        let tarball = dir.join(format!("{stem}-mock.tar"));
        write_source_archive(
            &job.packaging_dir,
            &format!("{stem}-mock"),
            ArchiveFormat::Tar,
            &tarball,
        )
        .map_err(|e| ToolError::io(&tarball, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgexport_schema::CommitId;
    use std::path::Path;

    fn job(root: &Path) -> ExportJob {
        let packaging = root.join("src/packaging");
        fs::create_dir_all(&packaging).unwrap();
        fs::write(packaging.join("foo.spec"), "Name: foo\nVersion: 1\n").unwrap();
        let scratch = root.join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        ExportJob {
            outdir: scratch,
            source_dir: root.join("src"),
            commit: CommitId::new("abc123"),
            spec_path: packaging.join("foo.spec"),
            packaging_dir: packaging,
            verbose: false,
        }
    }

    #[test]
    fn mock_writes_spec_and_tarball() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());
        MockTool::new().export(&job).unwrap();
        assert!(job.outdir.join("foo-mock/foo.spec").is_file());
        assert!(job.outdir.join("foo-mock/foo-mock.tar").is_file());
    }

    #[test]
    fn mock_failure_modes() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());

        let err = MockTool::with_behavior(MockBehavior::Fail("rejected".into()))
            .export(&job)
            .unwrap_err();
        assert!(err.is_export_failure());

        let err = MockTool::with_behavior(MockBehavior::Break("broken".into()))
            .export(&job)
            .unwrap_err();
        assert!(!err.is_export_failure());

        MockTool::with_behavior(MockBehavior::NoOutput)
            .export(&job)
            .unwrap();
        assert_eq!(fs::read_dir(&job.outdir).unwrap().count(), 0);
    }

    #[test]
    #[should_panic(expected = "mock panic")]
    fn mock_panics_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());
        let _ = MockTool::with_behavior(MockBehavior::Panic("mock panic".into())).export(&job);
    }
}
