//! CLI subprocess integration tests.
//!
//! These tests invoke the `pkgexport` binary against a local fixture
//! repository and verify exit codes and output directory contents. Tests that
//! need `git` skip themselves when it is not installed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const TEST_SPEC: &str = "\
Name:           test-package
Version:        0.1
Release:        0
Summary:        Test package
License:        GPL-2.0-or-later
Source0:        %{name}-%{version}.tar.bz2

%description
Test package.
";

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn git(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "Test Author")
        .env("GIT_AUTHOR_EMAIL", "author@example.com")
        .env("GIT_COMMITTER_NAME", "Test Committer")
        .env("GIT_COMMITTER_EMAIL", "committer@example.com")
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn commit(repo: &Path, name: &str, content: &str, message: &str) {
    let path = repo.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    git(repo, &["add", name]);
    git(repo, &["commit", "-q", "-m", message]);
}

/// Workspace with an origin repository at `<tmp>/orig`, tagged `v0.1` on the
/// commit that adds packaging, plus one later commit.
struct Workspace {
    tmp: tempfile::TempDir,
    url: String,
}

impl Workspace {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let origin = tmp.path().join("orig");
        fs::create_dir_all(&origin).unwrap();
        git(&origin, &["init", "-q"]);
        git(&origin, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        commit(&origin, "README", "Test package\n", "Initial version");
        commit(
            &origin,
            "packaging/test-package.spec",
            TEST_SPEC,
            "Add packaging files",
        );
        git(&origin, &["tag", "-a", "v0.1", "-m", "Version 0.1"]);
        commit(&origin, "foo.txt", "new data\n", "Update foo.txt");
        fs::create_dir(tmp.path().join("work")).unwrap();
        let url = origin.to_string_lossy().into_owned();
        Self { tmp, url }
    }

    fn work(&self) -> PathBuf {
        self.tmp.path().join("work")
    }

    /// `pkgexport` running in the work directory, isolated from user and
    /// system configuration.
    fn cmd(&self) -> Command {
        let mut cmd = pkgexport_bin();
        cmd.current_dir(self.work())
            .arg("--config")
            .arg(self.tmp.path().join("no.config"))
            .env("PKGEXPORT_REPO_CACHE_DIR", self.tmp.path().join("cache"));
        cmd
    }

    fn export(&self, args: &[&str]) -> i32 {
        let out = self.cmd().arg("--url").arg(&self.url).args(args).output().unwrap();
        out.status.code().unwrap_or(-1)
    }
}

fn pkgexport_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pkgexport"));
    for var in [
        "PKGEXPORT_REPO_CACHE_DIR",
        "PKGEXPORT_EXPORT_USER",
        "PKGEXPORT_EXPORT_GROUP",
        "PKGEXPORT_EXPORT_TOOL",
        "PKGEXPORT_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn cli_version_exits_zero() {
    let output = pkgexport_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("pkgexport"));
}

#[test]
fn cli_help_lists_options() {
    let output = pkgexport_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for option in ["--url", "--outdir", "--revision", "--error-pkg", "--git-meta"] {
        assert!(stdout.contains(option), "missing {option}");
    }
}

#[test]
fn cli_usage_errors_exit_two() {
    let output = pkgexport_bin().output().unwrap();
    assert_eq!(output.status.code(), Some(2));

    let output = pkgexport_bin()
        .args(["--url", "foo.git", "--verbose=foob"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let output = pkgexport_bin()
        .args(["--url", "foo.git", "--error-pkg=1,x"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_invalid_repository_is_service_error() {
    let tmp = tempfile::tempdir().unwrap();
    let output = pkgexport_bin()
        .current_dir(tmp.path())
        .args(["--url", "foo/bar.git", "--config"])
        .arg(tmp.path().join("no.config"))
        .env("PKGEXPORT_REPO_CACHE_DIR", tmp.path().join("cache"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_malformed_config_is_service_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("bad.conf");
    fs::write(&config, "[general]\nno-such-key = 1\n").unwrap();
    let output = pkgexport_bin()
        .current_dir(tmp.path())
        .args(["--url", "foo.git", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn cli_basic_export() {
    if !git_available() {
        return;
    }
    let ws = Workspace::new();
    assert_eq!(ws.export(&[]), 0);
    assert_eq!(
        listing(&ws.work()),
        vec!["test-package-0.1.tar.bz2", "test-package.spec"]
    );
}

#[test]
fn cli_outdir_is_created() {
    if !git_available() {
        return;
    }
    let ws = Workspace::new();
    assert_eq!(ws.export(&["--outdir=outdir", "--verbose=yes"]), 0);
    assert!(ws.work().join("outdir/test-package.spec").is_file());
}

#[test]
fn cli_revisions() {
    if !git_available() {
        return;
    }
    let ws = Workspace::new();
    assert_eq!(ws.export(&["--revision=master", "--outdir=a"]), 0);
    assert_eq!(ws.export(&["--revision=foobar", "--outdir=b"]), 1);
    assert_eq!(ws.export(&["--revision", "v0.1~1", "--outdir=c"]), 2);
    assert!(listing(&ws.work().join("c")).is_empty());
    assert!(!ws.work().join("b").exists());
}

#[test]
fn cli_error_package() {
    if !git_available() {
        return;
    }
    let ws = Workspace::new();
    assert_eq!(ws.export(&["--error-pkg=2,3", "--revision=foobar"]), 1);
    assert!(listing(&ws.work()).is_empty());

    assert_eq!(
        ws.export(&["--error-pkg=1,2,3", "--revision=foobar", "--outdir=foo"]),
        0
    );
    assert_eq!(
        listing(&ws.work().join("foo")),
        vec!["service-error", "service-error.spec"]
    );
    let log = fs::read_to_string(ws.work().join("foo/service-error")).unwrap();
    assert!(log.contains("foobar"));
}

#[test]
fn cli_git_meta() {
    if !git_available() {
        return;
    }
    let ws = Workspace::new();
    assert_eq!(ws.export(&["--git-meta=_git_meta"]), 0);
    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(ws.work().join("_git_meta")).unwrap()).unwrap();
    assert_eq!(meta["revision"], "HEAD");
    assert_eq!(meta["commit"].as_str().map(str::len), Some(40));

    assert_eq!(ws.export(&["--git-meta=test-package.spec"]), 1);
}

#[test]
fn cli_config_sets_cache_dir() {
    if !git_available() {
        return;
    }
    let ws = Workspace::new();
    fs::write(
        ws.work().join("my.conf"),
        "[general]\nrepo-cache-dir = \"my-repo-cache\"\n",
    )
    .unwrap();
    let status = pkgexport_bin()
        .current_dir(ws.work())
        .args(["--url", &ws.url, "--config", "my.conf", "--outdir=out"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));
    assert!(ws.work().join("my-repo-cache").is_dir());
    assert!(!ws.tmp.path().join("cache").exists());
}

#[test]
fn cli_export_user() {
    if !git_available() {
        return;
    }
    let ws = Workspace::new();
    let uid = current_uid();
    let status = ws
        .cmd()
        .args(["--url", &ws.url, "--outdir=same"])
        .env("PKGEXPORT_EXPORT_USER", &uid)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));

    let status = ws
        .cmd()
        .args(["--url", &ws.url, "--outdir=unknown"])
        .env("PKGEXPORT_EXPORT_USER", "_non_existent_user")
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

/// Effective uid of this process, read from `/proc`.
fn current_uid() -> String {
    let status = fs::read_to_string("/proc/self/status").unwrap();
    status
        .lines()
        .find_map(|l| l.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().nth(1))
        .unwrap()
        .to_owned()
}
