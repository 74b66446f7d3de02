use crate::errpkg::{maybe_synthesize, ERROR_LOG_FILE, ERROR_SPEC_FILE};
use crate::exporter::Exporter;
use crate::lifecycle::{validate_transition, RunState};
use crate::runlog::RunLog;
use crate::spec::resolve_spec;
use crate::{CoreError, EXIT_SUCCESS};
use pkgexport_cache::{GitRepoCache, RepositoryCache, WorkingCopy};
use pkgexport_runtime::{select_tool, ExportTool, RuntimeError};
use pkgexport_schema::{ExportRequest, IdentityConfig, RevisionMeta, ServiceConfig};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Drives one export request from repository checkout to exported files.
///
/// Every failure is classified into an exit code exactly once; allowlisted
/// codes are turned into an error package in the output directory.
pub struct Engine {
    config: ServiceConfig,
    cache: Box<dyn RepositoryCache>,
    tool: Box<dyn ExportTool>,
    log: RunLog,
}

/// Outcome of [`Engine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub exit_code: u8,
    pub final_state: RunState,
    /// Files placed in the output directory, sorted: the exported artifacts,
    /// or the error package pair.
    pub files: Vec<PathBuf>,
    pub error_package: bool,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == EXIT_SUCCESS
    }
}

struct StateTracker<'a> {
    state: RunState,
    log: &'a RunLog,
}

impl StateTracker<'_> {
    fn advance(&mut self, to: RunState) -> Result<(), CoreError> {
        validate_transition(self.state, to)?;
        self.log.debug(format!("state {} -> {to}", self.state));
        self.state = to;
        Ok(())
    }
}

impl Engine {
    /// Engine with the git repository cache and the configured export tool.
    pub fn new(config: ServiceConfig, log: RunLog) -> Result<Self, CoreError> {
        let tool = select_tool(&config.export_tool)?;
        let cache_root = std::path::absolute(&config.repo_cache_dir)?;
        let cache = Box::new(GitRepoCache::new(cache_root));
        Ok(Self::with_parts(config, cache, tool, log))
    }

    pub fn with_parts(
        config: ServiceConfig,
        cache: Box<dyn RepositoryCache>,
        tool: Box<dyn ExportTool>,
        log: RunLog,
    ) -> Self {
        Self {
            config,
            cache,
            tool,
            log,
        }
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn run(&self, request: &ExportRequest) -> RunReport {
        let mut states = StateTracker {
            state: RunState::Init,
            log: &self.log,
        };

        let err = match self.pipeline(request, &mut states) {
            Ok(files) => {
                return RunReport {
                    exit_code: EXIT_SUCCESS,
                    final_state: states.state,
                    files,
                    error_package: false,
                }
            }
            Err(err) => err,
        };

        let code = err.exit_code();
        self.log.error(err.to_string());
        if let CoreError::ExportCrashed {
            trace: Some(trace), ..
        } = &err
        {
            self.log.error(trace);
        }
        if let Err(e) = states.advance(RunState::Failed) {
            self.log.warn(e.to_string());
        }

        let (exit_code, emitted) =
            maybe_synthesize(code, &request.error_pkg, &self.log, &request.outdir);
        let mut files = Vec::new();
        if emitted {
            for to in [RunState::ErrorPackageEmitted, RunState::Done] {
                if let Err(e) = states.advance(to) {
                    self.log.warn(e.to_string());
                }
            }
            files.push(request.outdir.join(ERROR_LOG_FILE));
            files.push(request.outdir.join(ERROR_SPEC_FILE));
        }

        RunReport {
            exit_code,
            final_state: states.state,
            files,
            error_package: emitted,
        }
    }

    fn pipeline(
        &self,
        request: &ExportRequest,
        states: &mut StateTracker<'_>,
    ) -> Result<Vec<PathBuf>, CoreError> {
        request.validate()?;
        if !self.tool.available() {
            return Err(RuntimeError::ToolUnavailable(self.tool.name().to_owned()).into());
        }
        states.advance(RunState::ConfigLoaded)?;

        self.log.info(format!(
            "exporting {} at revision {}",
            request.url, request.revision
        ));
        let working_copy = self
            .cache
            .working_copy(&request.url, request.revision.as_str())?;
        self.log.info(format!(
            "revision {} is commit {}",
            request.revision,
            working_copy.commit()
        ));
        states.advance(RunState::RepoReady)?;

        fs::create_dir_all(&request.outdir).map_err(|source| CoreError::Outdir {
            path: request.outdir.clone(),
            source,
        })?;
        states.advance(RunState::OutdirReady)?;

        let desired = request.desired_spec_name()?;
        let packaging_dir = working_copy.path().join(&request.packaging_dir);
        let spec = resolve_spec(&packaging_dir, &desired)?;
        self.log.info(format!("using spec file {}", spec.file_name));
        states.advance(RunState::SpecResolved)?;

        let files = Exporter::new(self.tool.as_ref(), self.log.clone())
            .with_timeout(self.config.export_timeout)
            .with_verbose(request.verbose)
            .export(
                working_copy.path(),
                working_copy.commit(),
                &request.outdir,
                &spec,
                self.identity_for(request),
            )
            .into_result()?;
        for file in &files {
            self.log.info(format!("exported {}", file.display()));
        }
        states.advance(RunState::Exported)?;

        if let Some(name) = &request.git_meta {
            let path = write_metadata(request, &working_copy, name)?;
            self.log
                .info(format!("wrote revision metadata to {}", path.display()));
        }
        states.advance(RunState::MetadataWritten)?;
        states.advance(RunState::Done)?;
        Ok(files)
    }

    /// The request's identity override, or the configured one.
    fn identity_for<'a>(&'a self, request: &'a ExportRequest) -> &'a IdentityConfig {
        if request.identity.is_unchanged() {
            &self.config.identity
        } else {
            &request.identity
        }
    }
}

/// Write revision metadata as JSON to `outdir/<name>`. Never replaces an
/// existing file.
fn write_metadata(
    request: &ExportRequest,
    working_copy: &WorkingCopy,
    name: &Path,
) -> Result<PathBuf, CoreError> {
    let path = request.outdir.join(name);
    let meta = RevisionMeta {
        url: request.url.clone(),
        revision: request.revision.clone(),
        commit: working_copy.commit().clone(),
        info: working_copy.info().clone(),
        exported_at: chrono::Utc::now().to_rfc3339(),
    };
    let json = meta.to_json_pretty()?;

    let io_err = |source: std::io::Error| CoreError::Metadata {
        path: path.clone(),
        source,
    };
    let dir = path.parent().unwrap_or(&request.outdir);
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(json.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist_noclobber(&path).map_err(|e| io_err(e.error))?;
    Ok(path)
}
