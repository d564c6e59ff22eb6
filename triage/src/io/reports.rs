//! Report artifact storage under the reports directory.
//!
//! Reports are rendered fully in memory and written in a single call, so a
//! crash mid-iteration can never leave a partial report file behind.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Canonical report paths for one reports directory.
#[derive(Debug, Clone)]
pub struct ReportsDir {
    dir: PathBuf,
}

impl ReportsDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create reports dir {}", self.dir.display()))
    }

    /// Report file for one iteration, keyed by iteration number and
    /// timestamp.
    pub fn iteration_report_path(&self, iteration: u32, stamp: &str) -> PathBuf {
        self.dir.join(format!("iteration-{iteration:03}-{stamp}.md"))
    }

    /// Summary file for one run, keyed by the session start timestamp.
    pub fn summary_path(&self, session_stamp: &str) -> PathBuf {
        self.dir.join(format!("session-summary-{session_stamp}.md"))
    }

    /// Write a fully rendered artifact in one call.
    pub fn write(&self, path: &Path, contents: &str) -> Result<()> {
        self.ensure()?;
        fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), "report artifact written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_keyed_by_iteration_and_timestamp() {
        let reports = ReportsDir::new("/tmp/reports");
        assert!(
            reports
                .iteration_report_path(3, "20260101-000000")
                .ends_with("iteration-003-20260101-000000.md")
        );
        assert!(
            reports
                .summary_path("20260101-000000")
                .ends_with("session-summary-20260101-000000.md")
        );
    }

    #[test]
    fn write_creates_the_directory_when_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reports = ReportsDir::new(temp.path().join("nested").join("reports"));
        let path = reports.iteration_report_path(1, "stamp");

        reports.write(&path, "# report").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "# report");
    }
}
