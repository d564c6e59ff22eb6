//! Shared data model for the triage loop.
//!
//! These types define stable contracts between components. They are plain
//! snapshots: built once, never mutated after the producing call returns.

use serde::{Deserialize, Serialize};

/// One open backlog item, snapshotted from the tracker.
///
/// Refreshed every iteration; the prompt layer clips the body before it
/// reaches a briefing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub number: u64,
    pub title: String,
    /// Creation timestamp as reported by the tracker (RFC 3339).
    pub created_at: String,
    pub labels: Vec<String>,
    pub body: String,
}

/// Version-control snapshot, recomputed per probe call.
///
/// A failed probe yields a state carrying only `error` instead of
/// propagating, so briefings and reports can still be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    pub branch: String,
    /// Recent commit one-liners, newest first, newline-separated.
    pub recent_commits: String,
    /// Short working-tree status, or `(clean)`.
    pub status: String,
    pub error: Option<String>,
}

impl RepositoryState {
    /// Build the degraded state produced when the probe fails.
    pub fn from_error(error: impl Into<String>) -> Self {
        Self {
            branch: String::new(),
            recent_commits: String::new(),
            status: String::new(),
            error: Some(error.into()),
        }
    }
}

/// How much detail the agent backend could observe for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextGranularity {
    /// Individual tool invocations and text blocks were observed.
    ToolLevel,
    /// Only combined process output was available (fallback path).
    Aggregate,
}

/// Terminal completion data reported by the agent.
///
/// The fallback invocation path only knows the exit status, so everything
/// except `is_error` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub duration_ms: Option<u64>,
    pub cost_usd: Option<f64>,
    pub num_turns: Option<u32>,
    pub is_error: bool,
    pub result: Option<String>,
}

/// Structured account of one agent invocation.
///
/// Built incrementally while the event stream is consumed, immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Invocation start (RFC 3339). Always populated, even on faults.
    pub started_at: String,
    /// Invocation end (RFC 3339). Always populated, even on faults.
    pub ended_at: String,
    pub prompt_len: usize,
    /// Invoked tool names in arrival order.
    pub tools_used: Vec<String>,
    /// Captured text fragments, size-bounded at capture time.
    pub messages: Vec<String>,
    /// At most one terminal completion, or none if the stream never ended
    /// cleanly.
    pub completion: Option<Completion>,
    /// Fault captured during invocation; never propagated to the controller.
    pub error: Option<String>,
    pub granularity: TextGranularity,
}

/// Pure derivation from a [`SessionRecord`] and a repository commit delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationAnalysis {
    /// Work-item ids referenced by new commits, first-occurrence order,
    /// de-duplicated.
    pub completed_items: Vec<u64>,
    /// Commit one-liners created at or after the record's start timestamp.
    pub commits: Vec<String>,
    pub success: bool,
    pub needs_continuation: bool,
}

/// Truncate to at most `max_chars` characters, on a character boundary.
pub fn clip_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_chars_respects_multibyte_boundaries() {
        assert_eq!(clip_chars("héllo", 2), "hé");
        assert_eq!(clip_chars("abc", 10), "abc");
        assert_eq!(clip_chars("", 5), "");
    }

    #[test]
    fn error_state_carries_only_the_marker() {
        let state = RepositoryState::from_error("git not found");
        assert_eq!(state.error.as_deref(), Some("git not found"));
        assert!(state.branch.is_empty());
        assert!(state.recent_commits.is_empty());
        assert!(state.status.is_empty());
    }
}
