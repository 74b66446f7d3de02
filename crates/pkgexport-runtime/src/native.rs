//! In-process exporter: copies the packaging files and builds the source
//! tarball named by the spec's `Source0` tag.

use crate::archive::{write_source_archive, ArchiveFormat};
use crate::specfile::SpecHeader;
use crate::tool::{ExportJob, ExportTool, ToolError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct NativeTool;

impl Default for NativeTool {
    fn default() -> Self {
        Self
    }
}

impl NativeTool {
    pub fn new() -> Self {
        Self
    }

    /// Archive file name and format for `header`.
    pub fn archive_name(header: &SpecHeader) -> Result<(String, ArchiveFormat), ToolError> {
        match header.source_basename() {
            Some(base) => match ArchiveFormat::from_file_name(base) {
                Some(format) => Ok((base.to_owned(), format)),
                None => Err(ToolError::Export(format!(
                    "unsupported source archive '{base}': \
                     expected .tar, .tar.gz, .tgz, .tar.bz2 or .tar.xz"
                ))),
            },
            None => {
                let format = ArchiveFormat::Gzip;
                Ok((
                    format!("{}.{}", header.archive_prefix(), format.extension()),
                    format,
                ))
            }
        }
    }
}

impl ExportTool for NativeTool {
    fn name(&self) -> &'static str {
        "native"
    }

    fn available(&self) -> bool {
        true
    }

    fn export(&self, job: &ExportJob) -> Result<(), ToolError> {
        let content = fs::read_to_string(&job.spec_path).map_err(|e| {
            ToolError::Export(format!(
                "cannot read spec file {}: {e}",
                job.spec_path.display()
            ))
        })?;
        let header = SpecHeader::parse(&content).map_err(|e| {
            ToolError::Export(format!("{}: {e}", job.spec_file_name()))
        })?;
        let (archive_name, format) = Self::archive_name(&header)?;

        let export_dir = job.outdir.join(header.export_dir_name());
        fs::create_dir(&export_dir).map_err(|e| ToolError::io(&export_dir, e))?;

        let spec_dest = export_dir.join(job.spec_file_name());
        fs::write(&spec_dest, content.as_bytes()).map_err(|e| ToolError::io(&spec_dest, e))?;
        for extra in packaging_extras(&job.packaging_dir)? {
            let Some(file_name) = extra.file_name() else {
                continue;
            };
            let dest = export_dir.join(file_name);
            fs::copy(&extra, &dest).map_err(|e| ToolError::io(&extra, e))?;
        }

        let archive_path = export_dir.join(&archive_name);
        debug!(
            "packing {} as {archive_name} at {}",
            job.source_dir.display(),
            job.commit.short()
        );
        write_source_archive(
            &job.source_dir,
            &header.archive_prefix(),
            format,
            &archive_path,
        )
        .map_err(|e| ToolError::io(&archive_path, e))?;
        Ok(())
    }
}

/// Regular files of the packaging directory other than spec files, sorted.
fn packaging_extras(dir: &Path) -> Result<Vec<PathBuf>, ToolError> {
    let mut extras = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ToolError::io(dir, e))? {
        let entry = entry.map_err(|e| ToolError::io(dir, e))?;
        let path = entry.path();
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        let is_spec = path.extension().is_some_and(|ext| ext == "spec");
        if is_file && !is_spec {
            extras.push(path);
        }
    }
    extras.sort();
    Ok(extras)
}
