use crate::tool::{ExportJob, ExportTool, ToolError};
use std::ffi::OsString;
use std::process::{Command, Stdio};
use tracing::debug;

const STDERR_TAIL_LINES: usize = 20;

/// Wrapper around the external `gbs export` command.
pub struct GbsTool {
    program: String,
}

impl Default for GbsTool {
    fn default() -> Self {
        Self {
            program: "gbs".to_owned(),
        }
    }
}

impl GbsTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn command_args(job: &ExportJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if job.verbose {
            args.push("--verbose".into());
        }
        args.push("export".into());
        args.push(flag("--outdir=", job.outdir.as_os_str()));
        args.push(format!("--commit={}", job.commit).into());
        args.push(format!("--spec={}", job.spec_file_name()).into());
        args.push(flag(
            "--packaging-dir=",
            job.relative_packaging_dir().as_os_str(),
        ));
        args
    }
}

fn flag(name: &str, value: &std::ffi::OsStr) -> OsString {
    let mut s = OsString::from(name);
    s.push(value);
    s
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

impl ExportTool for GbsTool {
    fn name(&self) -> &'static str {
        "gbs"
    }

    fn available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    fn export(&self, job: &ExportJob) -> Result<(), ToolError> {
        let args = Self::command_args(job);
        debug!("running {} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&job.source_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ToolError::Export(format!(
            "{} export failed ({}):\n{}",
            self.program,
            output.status,
            tail(&stderr, STDERR_TAIL_LINES)
        )))
    }
}
