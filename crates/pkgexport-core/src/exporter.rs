//! Runs the export tool in an isolated child and moves its output into place.

use crate::runlog::RunLog;
use crate::spec::SpecCandidate;
use crate::CoreError;
use pkgexport_runtime::{
    resolve_identity, run_isolated, ChildReport, ExportJob, ExportTool, FailureCategory,
    RuntimeError, TargetIdentity,
};
use pkgexport_schema::{CommitId, IdentityConfig};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Result of one export attempt, classified once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Relocated artifact paths in the output directory, sorted.
    Success(Vec<PathBuf>),
    /// The tool rejected the export.
    ExpectedFailure(String),
    /// The tool failed in an unexpected way.
    UnexpectedCrash {
        message: String,
        trace: Option<String>,
    },
    /// The export could not be set up or its output not moved into place.
    SetupFailure(String),
}

impl ExportOutcome {
    pub fn into_result(self) -> Result<Vec<PathBuf>, CoreError> {
        match self {
            Self::Success(files) => Ok(files),
            Self::ExpectedFailure(message) => Err(CoreError::ExportFailed(message)),
            Self::UnexpectedCrash { message, trace } => {
                Err(CoreError::ExportCrashed { message, trace })
            }
            Self::SetupFailure(message) => Err(CoreError::ExportSetup(message)),
        }
    }
}

enum RelocateError {
    NoOutput,
    /// An exported directory would replace an existing non-directory.
    Conflict(PathBuf),
    Io(io::Error),
}

pub struct Exporter<'a> {
    tool: &'a dyn ExportTool,
    log: RunLog,
    timeout: Option<Duration>,
    verbose: bool,
}

impl<'a> Exporter<'a> {
    pub fn new(tool: &'a dyn ExportTool, log: RunLog) -> Self {
        Self {
            tool,
            log,
            timeout: None,
            verbose: false,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Export `spec` from the tree at `working_copy` into `outdir`.
    ///
    /// Scratch space is a fresh directory inside `outdir`, owned by the
    /// export identity and removed before returning. Nothing is retried.
    pub fn export(
        &self,
        working_copy: &Path,
        commit: &CommitId,
        outdir: &Path,
        spec: &SpecCandidate,
        identity: &IdentityConfig,
    ) -> ExportOutcome {
        let target = match resolve_identity(identity) {
            Ok(t) => t,
            Err(e) => return ExportOutcome::SetupFailure(e.to_string()),
        };

        let scratch = match tempfile::Builder::new()
            .prefix(".pkgexport-")
            .tempdir_in(outdir)
        {
            Ok(dir) => dir,
            Err(e) => {
                return ExportOutcome::SetupFailure(format!(
                    "failed to create scratch directory in {}: {e}",
                    outdir.display()
                ))
            }
        };
        self.log
            .debug(format!("scratch directory {}", scratch.path().display()));

        let outcome = self.export_in(
            scratch.path(),
            working_copy,
            commit,
            outdir,
            spec,
            &target,
        );

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            self.log.warn(format!(
                "failed to remove scratch directory {}: {e}",
                scratch_path.display()
            ));
        }
        outcome
    }

    fn export_in(
        &self,
        scratch: &Path,
        working_copy: &Path,
        commit: &CommitId,
        outdir: &Path,
        spec: &SpecCandidate,
        target: &TargetIdentity,
    ) -> ExportOutcome {
        if let Err(e) = std::os::unix::fs::chown(scratch, Some(target.uid), Some(target.gid)) {
            return ExportOutcome::SetupFailure(format!(
                "failed to hand scratch directory to {target}: {e}"
            ));
        }

        let job = ExportJob {
            outdir: scratch.to_path_buf(),
            source_dir: working_copy.to_path_buf(),
            commit: commit.clone(),
            spec_path: spec.path.clone(),
            packaging_dir: spec.dir().to_path_buf(),
            verbose: self.verbose,
        };
        self.log.info(format!(
            "exporting {} with {} as {target}",
            spec.file_name,
            self.tool.name()
        ));

        let report = match run_isolated(target, self.timeout, || self.tool.export(&job)) {
            Ok(report) => report,
            Err(RuntimeError::Timeout(limit)) => {
                return ExportOutcome::UnexpectedCrash {
                    message: format!("export timed out after {}s", limit.as_secs()),
                    trace: None,
                }
            }
            Err(e) => return ExportOutcome::SetupFailure(e.to_string()),
        };

        match report {
            ChildReport::Completed => {}
            ChildReport::Failed {
                category: FailureCategory::Export,
                message,
                ..
            } => return ExportOutcome::ExpectedFailure(message),
            ChildReport::Failed {
                category: FailureCategory::Identity,
                message,
                ..
            } => return ExportOutcome::SetupFailure(message),
            ChildReport::Failed {
                category: FailureCategory::Internal,
                message,
                trace,
            } => return ExportOutcome::UnexpectedCrash { message, trace },
        }

        match self.relocate(scratch, outdir) {
            Ok(files) => ExportOutcome::Success(files),
            Err(RelocateError::NoOutput) => ExportOutcome::UnexpectedCrash {
                message: format!(
                    "export tool '{}' produced no output directory",
                    self.tool.name()
                ),
                trace: None,
            },
            Err(RelocateError::Conflict(path)) => ExportOutcome::SetupFailure(format!(
                "cannot move exported directory over existing file {}",
                path.display()
            )),
            Err(RelocateError::Io(e)) => {
                ExportOutcome::SetupFailure(format!("failed to move exported files: {e}"))
            }
        }
    }

    /// Move the entries of the tool's output subdirectory into `outdir`,
    /// replacing same-named entries. Conflicts are detected before anything
    /// is moved.
    fn relocate(&self, scratch: &Path, outdir: &Path) -> Result<Vec<PathBuf>, RelocateError> {
        let mut subdirs = Vec::new();
        for entry in fs::read_dir(scratch).map_err(RelocateError::Io)? {
            let entry = entry.map_err(RelocateError::Io)?;
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                subdirs.push(entry.path());
            }
        }
        subdirs.sort();
        let Some(source) = subdirs.first() else {
            return Err(RelocateError::NoOutput);
        };
        if subdirs.len() > 1 {
            self.log.warn(format!(
                "export produced {} directories, using {}",
                subdirs.len(),
                source.display()
            ));
        }

        let mut pending = Vec::new();
        for entry in fs::read_dir(source).map_err(RelocateError::Io)? {
            let entry = entry.map_err(RelocateError::Io)?;
            let is_dir = entry.file_type().map_err(RelocateError::Io)?.is_dir();
            let dest = outdir.join(entry.file_name());
            let dest_is_dir = match dest.symlink_metadata() {
                Ok(meta) => Some(meta.is_dir()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => return Err(RelocateError::Io(e)),
            };
            if is_dir && dest_is_dir == Some(false) {
                return Err(RelocateError::Conflict(dest));
            }
            pending.push((entry.path(), dest, dest_is_dir == Some(true)));
        }

        let mut moved = Vec::new();
        for (from, dest, replace_dir) in pending {
            if replace_dir {
                fs::remove_dir_all(&dest).map_err(RelocateError::Io)?;
            }
            fs::rename(&from, &dest).map_err(RelocateError::Io)?;
            self.log.debug(format!("exported {}", dest.display()));
            moved.push(dest);
        }
        moved.sort();
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgexport_runtime::mock::{MockBehavior, MockTool};
    use pkgexport_runtime::ToolError;

    struct Fixture {
        _dir: tempfile::TempDir,
        source: PathBuf,
        outdir: PathBuf,
        spec: SpecCandidate,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let packaging = source.join("packaging");
        fs::create_dir_all(&packaging).unwrap();
        fs::write(packaging.join("foo.spec"), "Name: foo\nVersion: 1\n").unwrap();
        let outdir = dir.path().join("out");
        fs::create_dir(&outdir).unwrap();
        let spec = crate::spec::resolve_spec(&packaging, "foo").unwrap();
        Fixture {
            _dir: dir,
            source,
            outdir,
            spec,
        }
    }

    fn run(tool: &dyn ExportTool, fx: &Fixture) -> ExportOutcome {
        Exporter::new(tool, RunLog::new(false)).export(
            &fx.source,
            &CommitId::new("abc123"),
            &fx.outdir,
            &fx.spec,
            &IdentityConfig::default(),
        )
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn success_relocates_files_and_removes_scratch() {
        let fx = fixture();
        let outcome = run(&MockTool::new(), &fx);
        assert_eq!(
            outcome,
            ExportOutcome::Success(vec![
                fx.outdir.join("foo-mock.tar"),
                fx.outdir.join("foo.spec")
            ])
        );
        assert_eq!(entries(&fx.outdir), vec!["foo-mock.tar", "foo.spec"]);
        assert_eq!(
            fs::read(fx.outdir.join("foo.spec")).unwrap(),
            fs::read(&fx.spec.path).unwrap()
        );
    }

    #[test]
    fn relocation_overwrites_existing_files() {
        let fx = fixture();
        fs::write(fx.outdir.join("foo.spec"), "stale").unwrap();
        assert!(matches!(run(&MockTool::new(), &fx), ExportOutcome::Success(_)));
        assert_eq!(
            fs::read_to_string(fx.outdir.join("foo.spec")).unwrap(),
            "Name: foo\nVersion: 1\n"
        );
    }

    /// Writes `foo.spec` and a `docs/` directory into its output subdir.
    struct DocsTool;

    impl ExportTool for DocsTool {
        fn name(&self) -> &str {
            "docs"
        }

        fn available(&self) -> bool {
            true
        }

        fn export(&self, job: &ExportJob) -> Result<(), ToolError> {
            let out = job.outdir.join("foo-1");
            let docs = out.join("docs");
            fs::create_dir_all(&docs).map_err(|e| ToolError::io(&docs, e))?;
            for path in [out.join("foo.spec"), docs.join("README")] {
                fs::write(&path, "content").map_err(|e| ToolError::io(&path, e))?;
            }
            Ok(())
        }
    }

    #[test]
    fn directory_over_existing_file_moves_nothing() {
        let fx = fixture();
        fs::write(fx.outdir.join("docs"), "not a directory").unwrap();
        let outcome = run(&DocsTool, &fx);
        assert!(matches!(
            outcome,
            ExportOutcome::SetupFailure(m) if m.contains("docs")
        ));
        assert_eq!(entries(&fx.outdir), vec!["docs"]);
    }

    #[test]
    fn directories_replace_existing_directories() {
        let fx = fixture();
        fs::create_dir(fx.outdir.join("docs")).unwrap();
        fs::write(fx.outdir.join("docs/stale"), "old").unwrap();
        assert!(matches!(run(&DocsTool, &fx), ExportOutcome::Success(_)));
        assert_eq!(entries(&fx.outdir.join("docs")), vec!["README"]);
        assert_eq!(entries(&fx.outdir), vec!["docs", "foo.spec"]);
    }

    #[test]
    fn expected_failure_removes_scratch() {
        let fx = fixture();
        let tool = MockTool::with_behavior(MockBehavior::Fail("spec rejected".into()));
        assert_eq!(
            run(&tool, &fx),
            ExportOutcome::ExpectedFailure("spec rejected".into())
        );
        assert!(entries(&fx.outdir).is_empty());
    }

    #[test]
    fn crash_carries_trace() {
        let fx = fixture();
        let tool = MockTool::with_behavior(MockBehavior::Panic("index out of range".into()));
        let ExportOutcome::UnexpectedCrash { message, trace } = run(&tool, &fx) else {
            panic!("expected crash");
        };
        assert!(message.contains("index out of range"));
        assert!(trace.is_some_and(|t| !t.is_empty()));
        assert!(entries(&fx.outdir).is_empty());
    }

    #[test]
    fn internal_error_is_a_crash() {
        let fx = fixture();
        let tool = MockTool::with_behavior(MockBehavior::Break("broken pipe".into()));
        assert!(matches!(
            run(&tool, &fx),
            ExportOutcome::UnexpectedCrash { trace: Some(_), .. }
        ));
    }

    #[test]
    fn missing_output_directory_is_a_crash() {
        let fx = fixture();
        let tool = MockTool::with_behavior(MockBehavior::NoOutput);
        assert!(matches!(
            run(&tool, &fx),
            ExportOutcome::UnexpectedCrash { trace: None, .. }
        ));
        assert!(entries(&fx.outdir).is_empty());
    }

    #[test]
    fn unknown_user_is_setup_failure() {
        let fx = fixture();
        let outcome = Exporter::new(&MockTool::new(), RunLog::new(false)).export(
            &fx.source,
            &CommitId::new("abc123"),
            &fx.outdir,
            &fx.spec,
            &IdentityConfig::new(Some("pkgexport-no-such-user".into()), None),
        );
        assert!(matches!(
            outcome,
            ExportOutcome::SetupFailure(m) if m.contains("pkgexport-no-such-user")
        ));
        assert!(entries(&fx.outdir).is_empty());
    }

    #[test]
    fn missing_outdir_is_setup_failure() {
        let fx = fixture();
        let outcome = Exporter::new(&MockTool::new(), RunLog::new(false)).export(
            &fx.source,
            &CommitId::new("abc123"),
            &fx.outdir.join("missing"),
            &fx.spec,
            &IdentityConfig::default(),
        );
        assert!(matches!(outcome, ExportOutcome::SetupFailure(_)));
    }

    #[test]
    fn outcome_maps_to_exit_codes() {
        assert!(ExportOutcome::Success(vec![]).into_result().is_ok());
        let code = |o: ExportOutcome| o.into_result().unwrap_err().exit_code();
        assert_eq!(code(ExportOutcome::SetupFailure("x".into())), 1);
        assert_eq!(code(ExportOutcome::ExpectedFailure("x".into())), 2);
        assert_eq!(
            code(ExportOutcome::UnexpectedCrash {
                message: "x".into(),
                trace: None
            }),
            3
        );
    }
}
