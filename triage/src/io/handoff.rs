//! Handoff checkpoint storage.
//!
//! Exactly one "latest" checkpoint exists at any time; saving replaces it
//! atomically (temp file + rename) and appends an immutable timestamped
//! archive copy. No internal locking: the controller is single-threaded and
//! invocations are strictly serial, so no concurrent writers exist by
//! construction.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

const LATEST_FILE: &str = "latest-handoff.md";

/// Persists and loads the continuation briefing between invocations.
#[derive(Debug, Clone)]
pub struct HandoffStore {
    dir: PathBuf,
}

impl HandoffStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// Load the latest checkpoint text, or `None` before the first save.
    pub fn load(&self) -> Result<Option<String>> {
        let path = self.latest_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read handoff {}", path.display()))?;
        Ok(Some(contents))
    }

    /// Replace the latest checkpoint and archive a timestamped copy.
    pub fn save(&self, briefing: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create handoff dir {}", self.dir.display()))?;

        let path = self.latest_path();
        let tmp_path = path.with_extension("md.tmp");
        fs::write(&tmp_path, briefing)
            .with_context(|| format!("write temp handoff {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("replace handoff {}", path.display()))?;

        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let archive_path = self.dir.join(format!("handoff-{stamp}.md"));
        fs::write(&archive_path, briefing)
            .with_context(|| format!("write handoff archive {}", archive_path.display()))?;

        debug!(path = %path.display(), archive = %archive_path.display(), "handoff saved");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_before_first_save_is_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = HandoffStore::new(temp.path());
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = HandoffStore::new(temp.path());

        store.save("briefing one").expect("save");
        assert_eq!(store.load().expect("load").as_deref(), Some("briefing one"));
    }

    #[test]
    fn save_replaces_latest_and_archives_copies() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = HandoffStore::new(temp.path());

        store.save("first").expect("save first");
        store.save("second").expect("save second");

        assert_eq!(store.load().expect("load").as_deref(), Some("second"));

        let archives: Vec<String> = fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("handoff-"))
            .collect();
        assert!(!archives.is_empty());
        // No leftover temp file after the atomic replace.
        assert!(!temp.path().join("latest-handoff.md.tmp").exists());
    }
}
