//! Git adapter for the triage loop.
//!
//! The loop only needs a handful of read operations plus a single commit
//! path for report artifacts, so we keep a small, explicit wrapper around
//! `git` subprocess calls. Calls are blocking and bounded by the operating
//! system, not by an internal timeout.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::RepositoryState;

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name.
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Return up to `count` commit one-liners, newest first.
    pub fn recent_commits(&self, count: usize) -> Result<String> {
        let arg = format!("-{count}");
        let out = self.run_capture(&["log", "--oneline", &arg])?;
        Ok(out.trim().to_string())
    }

    /// Return the short working-tree status, or `(clean)`.
    pub fn status_short(&self) -> Result<String> {
        let out = self.run_capture(&["status", "--short"])?;
        let trimmed = out.trim();
        if trimmed.is_empty() {
            Ok("(clean)".to_string())
        } else {
            Ok(trimmed.to_string())
        }
    }

    /// Return commit one-liners created at or after `since` (a timestamp git
    /// understands, e.g. RFC 3339), newest first, capped at `limit`.
    pub fn log_since(&self, since: &str, limit: usize) -> Result<Vec<String>> {
        let since_arg = format!("--since={since}");
        let limit_arg = format!("-{limit}");
        let out = self.run_capture(&["log", "--oneline", &since_arg, &limit_arg])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Stage everything under `path` (respects .gitignore).
    pub fn add_path(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy().into_owned();
        self.run_checked(&["add", &path])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does
    /// nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Take a full repository snapshot for briefings and reports.
///
/// Any failure degrades to an error-marked [`RepositoryState`] instead of
/// propagating; the loop keeps going on a broken probe.
#[instrument(skip_all)]
pub fn probe_state(git: &Git, recent_commit_count: usize) -> RepositoryState {
    let snapshot = || -> Result<RepositoryState> {
        Ok(RepositoryState {
            branch: git.current_branch()?,
            recent_commits: git.recent_commits(recent_commit_count)?,
            status: git.status_short()?,
            error: None,
        })
    };
    match snapshot() {
        Ok(state) => {
            debug!(branch = %state.branch, "repository state probed");
            state
        }
        Err(err) => {
            warn!(err = format!("{err:#}"), "repository probe failed");
            RepositoryState::from_error(format!("{err:#}"))
        }
    }
}

/// True if `path` holds version-control metadata.
pub fn is_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn probes_branch_log_and_status() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());

        let state = probe_state(&git, 5);
        assert!(state.error.is_none());
        assert!(!state.branch.is_empty());
        assert!(state.recent_commits.contains("initial commit"));
        assert_eq!(state.status, "(clean)");
    }

    #[test]
    fn probe_failure_degrades_to_error_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());

        let state = probe_state(&git, 5);
        assert!(state.error.is_some());
    }

    #[test]
    fn log_since_sees_new_commits_only() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());

        repo.commit_file("a.txt", "a", "fix: resolve #42").expect("commit");
        let commits = git
            .log_since("2000-01-01T00:00:00+00:00", 10)
            .expect("log since");
        assert!(commits.iter().any(|line| line.contains("resolve #42")));

        let commits = git
            .log_since("2100-01-01T00:00:00+00:00", 10)
            .expect("log since future");
        assert!(commits.is_empty());
    }

    #[test]
    fn commit_staged_skips_when_nothing_staged() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        assert!(!git.commit_staged("docs: empty").expect("commit"));
    }

    #[test]
    fn detects_git_metadata() {
        let repo = TestRepo::new().expect("repo");
        assert!(is_git_repo(repo.root()));

        let temp = tempfile::tempdir().expect("tempdir");
        assert!(!is_git_repo(temp.path()));
    }
}
