//! Work-item source backed by the `gh` CLI.
//!
//! The loop needs a bounded snapshot of open issues per iteration and
//! nothing else from the tracker; a failed fetch degrades to an empty
//! backlog so a tracker outage never stops the loop.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::types::WorkItem;

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIssue {
    number: u64,
    title: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    labels: Vec<RawLabel>,
    #[serde(default)]
    body: Option<String>,
}

impl From<RawIssue> for WorkItem {
    fn from(raw: RawIssue) -> Self {
        Self {
            number: raw.number,
            title: raw.title,
            created_at: raw.created_at,
            labels: raw.labels.into_iter().map(|label| label.name).collect(),
            body: raw.body.unwrap_or_default(),
        }
    }
}

/// Parse the JSON payload produced by `gh issue list --json ...`.
pub fn parse_items(payload: &str) -> Result<Vec<WorkItem>> {
    let raw: Vec<RawIssue> =
        serde_json::from_str(payload).context("parse issue list json")?;
    Ok(raw.into_iter().map(WorkItem::from).collect())
}

/// Fetch up to `limit` open issues, newest first.
///
/// On any failure (missing `gh`, auth, network, malformed payload) this
/// logs a warning and returns an empty backlog.
pub fn fetch_open_items(repo_path: &Path, limit: usize) -> Vec<WorkItem> {
    let fetch = || -> Result<Vec<WorkItem>> {
        let limit_arg = limit.to_string();
        let output = Command::new("gh")
            .args([
                "issue",
                "list",
                "--state",
                "open",
                "--limit",
                &limit_arg,
                "--json",
                "number,title,createdAt,labels,body",
            ])
            .current_dir(repo_path)
            .output()
            .context("spawn gh issue list")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("gh issue list failed: {}", stderr.trim()));
        }
        parse_items(&String::from_utf8_lossy(&output.stdout))
    };

    match fetch() {
        Ok(items) => {
            debug!(count = items.len(), "fetched open work items");
            items
        }
        Err(err) => {
            warn!(err = format!("{err:#}"), "could not fetch work items");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gh_issue_payload() {
        let payload = r#"[
            {
                "number": 42,
                "title": "Flaky handler",
                "createdAt": "2026-07-30T10:00:00Z",
                "labels": [{"name": "bug"}, {"name": "good first issue"}],
                "body": "Steps to reproduce..."
            },
            {
                "number": 7,
                "title": "Missing docs",
                "createdAt": "2026-07-01T10:00:00Z",
                "labels": [],
                "body": null
            }
        ]"#;

        let items = parse_items(payload).expect("parse");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].number, 42);
        assert_eq!(items[0].labels, vec!["bug", "good first issue"]);
        assert_eq!(items[1].body, "");
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(parse_items("not json").is_err());
    }

    #[test]
    fn fetch_failure_returns_empty_backlog() {
        // Temp dir is not a repo and has no gh remote configured; whatever
        // the local environment, this must degrade to empty, not error.
        let temp = tempfile::tempdir().expect("tempdir");
        let items = fetch_open_items(temp.path(), 5);
        assert!(items.is_empty());
    }
}
