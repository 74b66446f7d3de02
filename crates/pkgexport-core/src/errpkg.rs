//! Error package: a stand-in export that carries a failed run's log forward.
//!
//! When a run fails with an allowlisted exit code, the output directory gets
//! the run log plus a spec file whose `%prep` prints that log and fails. The
//! downstream build then fails with the export diagnostics instead of finding
//! nothing to build.

use crate::runlog::RunLog;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const ERROR_LOG_FILE: &str = "service-error";
pub const ERROR_SPEC_FILE: &str = "service-error.spec";

pub const ERROR_SPEC: &str = r#"Name:           service-error
Version:        1
Release:        0
Summary:        Placeholder for a failed source export
License:        NONE
Source0:        service-error

%description
Created because exporting the package sources failed. Building this package
prints the export log and fails.

%prep
echo "============================================================"
echo "                SOURCE EXPORT FAILED, LOG:"
echo "============================================================"
cat %{SOURCE0}
echo "============================================================"
exit 1

%build

%install

%files
"#;

/// Turn an allowlisted failure into an error package.
///
/// Returns the final exit code and whether the package was written. Code 0
/// and codes outside `allowlist` pass through untouched. If writing fails,
/// the original code is kept and the failure goes to `log`.
pub fn maybe_synthesize(
    exit_code: u8,
    allowlist: &BTreeSet<u8>,
    log: &RunLog,
    outdir: &Path,
) -> (u8, bool) {
    if exit_code == 0 || !allowlist.contains(&exit_code) {
        return (exit_code, false);
    }

    log.info(format!(
        "exit code {exit_code} is in the error-package list, writing {ERROR_SPEC_FILE}"
    ));
    match write_error_package(&log.contents(), outdir) {
        Ok(_) => (0, true),
        Err(e) => {
            log.error(format!(
                "failed to write error package to {}: {e}",
                outdir.display()
            ));
            (exit_code, false)
        }
    }
}

/// Write the log and the failing spec into `outdir`, creating it if needed.
/// Returns the two written paths.
pub fn write_error_package(log_text: &str, outdir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(outdir)?;
    let log_path = outdir.join(ERROR_LOG_FILE);
    let spec_path = outdir.join(ERROR_SPEC_FILE);
    write_atomic(outdir, &log_path, log_text.as_bytes())?;
    write_atomic(outdir, &spec_path, ERROR_SPEC.as_bytes())?;
    Ok(vec![log_path, spec_path])
}

fn write_atomic(dir: &Path, dest: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
