//! Version-control collaborator.
//!
//! The orchestrator only talks to [`VersionControl`]; [`GitCli`] implements it
//! by running the `git` executable inside the project checkout. All calls are
//! blocking and carry no timeout.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use timerow_core::error::{Result, TimerowError};
use timerow_core::secrets::redact;
use tracing::debug;

/// Narrow interface over the repository the dataset is published to.
pub trait VersionControl: Send {
    /// `true` when `path` differs from the last committed version.
    fn status(&self, path: &Path) -> Result<bool>;

    fn add(&self, path: &Path) -> Result<()>;

    fn commit(&self, message: &str) -> Result<()>;

    /// Hash of the current `HEAD` commit, if there is one.
    fn head_ref(&self) -> Result<Option<String>>;

    fn push(&self, remote: &str, branch: &str) -> Result<()>;

    fn remote_url(&self, remote: &str) -> Result<String>;

    fn set_remote_url(&self, remote: &str, url: &str) -> Result<()>;
}

// ── GitCli ────────────────────────────────────────────────────────────────────

/// [`VersionControl`] backed by the `git` command-line client.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
    program: PathBuf,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            program: PathBuf::from("git"),
        }
    }

    /// Use a different executable than `git` from `PATH`.
    #[cfg(test)]
    fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Run `git <args>`; `label` is what gets logged and reported, so it must
    /// never contain credentials.
    fn run(&self, label: &str, args: &[&str]) -> Result<Output> {
        debug!("git {}", label);
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| TimerowError::VersionControl {
                command: label.to_string(),
                detail: format!("cannot start {}: {}", self.program.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = match stderr.trim() {
                "" => output.status.to_string(),
                text => format!("{}: {}", output.status, text),
            };
            return Err(TimerowError::VersionControl {
                command: label.to_string(),
                detail: redact(&detail, None),
            });
        }
        Ok(output)
    }

    /// Paths handed to git are resolved against the process working
    /// directory, not the checkout.
    fn path_arg(&self, label: &str, path: &Path) -> Result<String> {
        absolute_path_arg(label, path, std::env::current_dir)
    }
}

fn absolute_path_arg(
    label: &str,
    path: &Path,
    cwd: impl FnOnce() -> std::io::Result<PathBuf>,
) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let base = cwd().map_err(|e| TimerowError::VersionControl {
            command: label.to_string(),
            detail: format!("cannot resolve {}: {}", path.display(), e),
        })?;
        base.join(path)
    };
    Ok(absolute.to_string_lossy().into_owned())
}

impl VersionControl for GitCli {
    fn status(&self, path: &Path) -> Result<bool> {
        let path = self.path_arg("status", path)?;
        let output = self.run("status", &["status", "--porcelain", "--", &path])?;
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn add(&self, path: &Path) -> Result<()> {
        let path = self.path_arg("add", path)?;
        self.run("add", &["add", "--", &path]).map(|_| ())
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.run("commit", &["commit", "-m", message]).map(|_| ())
    }

    fn head_ref(&self) -> Result<Option<String>> {
        let output = self.run("rev-parse", &["rev-parse", "HEAD"])?;
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!hash.is_empty()).then_some(hash))
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run("push", &["push", remote, branch]).map(|_| ())
    }

    fn remote_url(&self, remote: &str) -> Result<String> {
        let output = self.run("remote get-url", &["remote", "get-url", remote])?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn set_remote_url(&self, remote: &str, url: &str) -> Result<()> {
        self.run("remote set-url", &["remote", "set-url", remote, url])
            .map(|_| ())
    }
}

// ── Credential embedding ──────────────────────────────────────────────────────

/// Return `url` with `token` embedded when it is a plain `https://` URL
/// without credentials; `None` when no rewrite is needed.
pub fn authenticated_url(url: &str, token: &str) -> Option<String> {
    let rest = url.strip_prefix("https://")?;
    let host_part = rest.split('/').next().unwrap_or(rest);
    if host_part.contains('@') {
        return None;
    }
    Some(format!("https://x-access-token:{}@{}", token, rest))
}

// ── Tests ─────────────────────────────────────────────────────────────────────


/// Throwaway checkout with a bare `origin`, for tests that need real git.
#[cfg(test)]
pub(crate) mod test_repo {
    use std::path::{Path, PathBuf};
    use std::process::Command;

    use tempfile::TempDir;

    pub(crate) struct TestRepo {
        _dir: TempDir,
        pub(crate) work_dir: PathBuf,
        pub(crate) remote_dir: PathBuf,
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .expect("git runs");
        assert!(status.success(), "git {:?} failed", args);
    }

    impl TestRepo {
        /// `None` when no `git` executable is available.
        pub(crate) fn init() -> Option<Self> {
            if Command::new("git").arg("--version").output().is_err() {
                return None;
            }
            let dir = TempDir::new().unwrap();
            let root = dir.path().canonicalize().unwrap();
            let work_dir = root.join("work");
            let remote_dir = root.join("remote.git");
            std::fs::create_dir_all(&work_dir).unwrap();

            git(&root, &["init", "--bare", "--quiet", "remote.git"]);
            git(&work_dir, &["init", "--quiet"]);
            git(&work_dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
            git(&work_dir, &["config", "user.name", "timerow"]);
            git(&work_dir, &["config", "user.email", "timerow@localhost"]);
            git(&work_dir, &["config", "commit.gpgsign", "false"]);
            git(
                &work_dir,
                &["remote", "add", "origin", &remote_dir.to_string_lossy()],
            );

            Some(Self {
                _dir: dir,
                work_dir,
                remote_dir,
            })
        }
    }
}
