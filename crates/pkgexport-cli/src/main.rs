mod export;

use clap::{Parser, ValueEnum};
use pkgexport_schema::{parse_exit_codes, DEFAULT_PACKAGING_DIR, DEFAULT_REVISION};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum YesNo {
    Yes,
    No,
}

#[derive(Debug, Parser)]
#[command(
    name = "pkgexport",
    version,
    about = "Export a package spec file and source archive from a git repository"
)]
struct Cli {
    /// Remote repository URL.
    #[arg(long)]
    url: String,

    /// Output directory; created if missing.
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    /// Commit, branch or tag to export.
    #[arg(long, default_value = DEFAULT_REVISION)]
    revision: String,

    /// Enable verbose output.
    #[arg(long, value_enum, default_value = "no")]
    verbose: YesNo,

    /// Spec file to export; defaults to the one matching the repository name.
    #[arg(long)]
    spec: Option<String>,

    /// Directory holding the spec files, relative to the repository root.
    #[arg(long, default_value = DEFAULT_PACKAGING_DIR)]
    packaging_dir: PathBuf,

    /// Configuration file; replaces the default search path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write revision metadata as JSON to this file in the output directory.
    #[arg(long)]
    git_meta: Option<PathBuf>,

    /// Comma-separated exit codes that produce an error package instead.
    #[arg(long, value_parser = parse_error_pkg)]
    error_pkg: Option<BTreeSet<u8>>,
}

impl Cli {
    fn verbose(&self) -> bool {
        self.verbose == YesNo::Yes
    }
}

fn parse_error_pkg(input: &str) -> Result<BTreeSet<u8>, String> {
    parse_exit_codes(input).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("PKGEXPORT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    ExitCode::from(export::run(&cli))
}
