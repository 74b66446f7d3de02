use std::fmt;
use std::process::{Command, Stdio};

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new(name)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Check the external programs needed to export with `tool`.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_tool_prereqs(tool: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists("git") {
        missing.push(MissingPrereq {
            name: "git",
            purpose: "cloning and checking out package repositories",
            install_hint: "zypper install git | apt install git | dnf install git | pacman -S git",
        });
    }

    if tool == "gbs" && !command_exists("gbs") {
        missing.push(MissingPrereq {
            name: "gbs",
            purpose: "exporting packaging with `gbs export`",
            install_hint: "install the gbs package from the Tizen tools repository",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\npkgexport needs these tools to export packaging.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "git",
            purpose: "cloning",
            install_hint: "apt install git",
        };
        let s = format!("{m}");
        assert!(s.contains("git"));
        assert!(s.contains("cloning"));
        assert!(s.contains("apt install git"));
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items = vec![
            MissingPrereq {
                name: "git",
                purpose: "cloning",
                install_hint: "apt install git",
            },
            MissingPrereq {
                name: "gbs",
                purpose: "export",
                install_hint: "see docs",
            },
        ];
        let output = format_missing(&items);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("git"));
        assert!(output.contains("gbs"));
    }

    #[test]
    fn native_tool_never_requires_gbs() {
        assert!(check_tool_prereqs("native").iter().all(|m| m.name != "gbs"));
    }

    #[test]
    fn missing_command_is_detected() {
        assert!(!command_exists("pkgexport-definitely-not-installed"));
    }
}
