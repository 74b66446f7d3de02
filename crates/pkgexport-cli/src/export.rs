use crate::Cli;
use pkgexport_core::{Engine, RunLog, EXIT_SERVICE_ERROR};
use pkgexport_runtime::{check_tool_prereqs, format_missing};
use pkgexport_schema::{ExportRequest, ServiceConfig};
use tracing::{debug, info, warn};

/// Run one export as described by `cli` and return the process exit code.
pub fn run(cli: &Cli) -> u8 {
    let mut config = match ServiceConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_SERVICE_ERROR;
        }
    };
    config.apply_env(|key| std::env::var(key).ok());
    debug!(
        "repository cache {}, export tool {}",
        config.repo_cache_dir.display(),
        config.export_tool
    );

    let missing = check_tool_prereqs(&config.export_tool);
    if !missing.is_empty() {
        warn!("{}", format_missing(&missing));
    }

    let outdir = match std::path::absolute(&cli.outdir) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("error: invalid output directory {}: {e}", cli.outdir.display());
            return EXIT_SERVICE_ERROR;
        }
    };

    let mut request = ExportRequest::new(cli.url.as_str(), outdir)
        .with_revision(cli.revision.as_str())
        .with_verbose(cli.verbose())
        .with_error_pkg(cli.error_pkg.clone().unwrap_or_default());
    request.packaging_dir.clone_from(&cli.packaging_dir);
    if let Some(spec) = &cli.spec {
        request = request.with_spec(spec.as_str());
    }
    if let Some(git_meta) = &cli.git_meta {
        request = request.with_git_meta(git_meta);
    }

    let engine = match Engine::new(config, RunLog::new(cli.verbose())) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_SERVICE_ERROR;
        }
    };

    let report = engine.run(&request);
    if report.error_package {
        info!("wrote error package to {}", request.outdir.display());
    }
    debug!("run finished in state {} with exit code {}", report.final_state, report.exit_code);
    report.exit_code
}
