//! Briefing rendering for agent invocations.
//!
//! Pure functions from backlog/repository snapshots to briefing text. The
//! controller persists the rendered handoff briefing as the checkpoint for
//! the next invocation.

use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::{RepositoryState, WorkItem, clip_chars};

const INITIAL_TEMPLATE: &str = include_str!("prompts/initial.md");
const HANDOFF_TEMPLATE: &str = include_str!("prompts/handoff.md");

/// At most this many backlog items are folded into a briefing.
const MAX_BRIEFING_ITEMS: usize = 15;
/// Item body previews are clipped to this many characters.
const PREVIEW_CHARS: usize = 200;
/// Each lesson fragment is clipped to this many characters.
const LESSON_CHARS: usize = 200;
/// At most this many lessons are folded into a handoff briefing.
const MAX_LESSONS: usize = 5;

/// Backlog item context for template rendering.
#[derive(Debug, Clone, Serialize)]
struct ItemContext {
    number: u64,
    title: String,
    created: String,
    labels: String,
    preview: String,
}

impl ItemContext {
    fn from_item(item: &WorkItem) -> Self {
        Self {
            number: item.number,
            title: item.title.clone(),
            // Just the date part of the tracker timestamp.
            created: clip_chars(&item.created_at, 10),
            labels: if item.labels.is_empty() {
                "none".to_string()
            } else {
                item.labels.join(", ")
            },
            preview: clip_chars(&item.body.replace('\n', " "), PREVIEW_CHARS),
        }
    }
}

/// Template engine wrapper around minijinja.
struct BriefingEngine {
    env: Environment<'static>,
}

impl BriefingEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("initial", INITIAL_TEMPLATE)
            .expect("initial template should be valid");
        env.add_template("handoff", HANDOFF_TEMPLATE)
            .expect("handoff template should be valid");
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> String {
        let template = self
            .env
            .get_template(name)
            .expect("template should be registered");
        template
            .render(ctx)
            .expect("briefing template rendering should not fail")
    }
}

fn item_contexts(backlog: &[WorkItem]) -> Vec<ItemContext> {
    backlog
        .iter()
        .take(MAX_BRIEFING_ITEMS)
        .map(ItemContext::from_item)
        .collect()
}

/// Render the briefing for a fresh run with no prior checkpoint.
pub fn initial_briefing(
    backlog: &[WorkItem],
    repo: &RepositoryState,
    prior_summary: Option<&str>,
) -> String {
    let engine = BriefingEngine::new();
    engine.render(
        "initial",
        context! {
            prior_summary => prior_summary.map(str::trim).filter(|s| !s.is_empty()),
            items => item_contexts(backlog),
            repo => repo,
        },
    )
}

/// Render the handoff briefing persisted for the next invocation.
pub fn handoff_briefing(
    completed: &[u64],
    backlog: &[WorkItem],
    repo: &RepositoryState,
    lessons: &[String],
    iteration: u32,
) -> String {
    let lessons: Vec<String> = lessons
        .iter()
        .rev()
        .take(MAX_LESSONS)
        .rev()
        .map(|lesson| clip_chars(lesson, LESSON_CHARS))
        .collect();

    let engine = BriefingEngine::new();
    engine.render(
        "handoff",
        context! {
            iteration => iteration,
            completed => completed,
            lessons => lessons,
            items => item_contexts(backlog),
            repo => repo,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_repo() -> RepositoryState {
        RepositoryState {
            branch: "main".to_string(),
            recent_commits: "abc123 fix: resolve #42".to_string(),
            status: "(clean)".to_string(),
            error: None,
        }
    }

    fn item(number: u64) -> WorkItem {
        WorkItem {
            number,
            title: format!("issue {number}"),
            created_at: "2026-08-01T12:00:00Z".to_string(),
            labels: vec!["bug".to_string()],
            body: "first line\nsecond line".to_string(),
        }
    }

    #[test]
    fn initial_briefing_without_history_uses_placeholder() {
        let briefing = initial_briefing(&[item(7)], &clean_repo(), None);

        assert!(briefing.contains("No previous session data available."));
        assert!(briefing.contains("number=\"7\""));
        assert!(briefing.contains("created=\"2026-08-01\""));
        assert!(briefing.contains("labels=\"bug\""));
        assert!(briefing.contains("<branch>main</branch>"));
        // Newlines in the body are flattened for the preview.
        assert!(briefing.contains("first line second line"));
    }

    #[test]
    fn initial_briefing_reports_empty_backlog() {
        let briefing = initial_briefing(&[], &clean_repo(), None);
        assert!(briefing.contains("No open issues found."));
    }

    #[test]
    fn briefing_bounds_item_count() {
        let backlog: Vec<WorkItem> = (1..=20).map(item).collect();
        let briefing = initial_briefing(&backlog, &clean_repo(), None);

        assert!(briefing.contains("number=\"15\""));
        assert!(!briefing.contains("number=\"16\""));
    }

    #[test]
    fn handoff_briefing_folds_in_completed_ids_and_lessons() {
        let lessons: Vec<String> = (1..=7).map(|i| format!("lesson {i}")).collect();
        let briefing = handoff_briefing(&[42, 7], &[item(9)], &clean_repo(), &lessons, 3);

        assert!(briefing.contains("<iteration>3</iteration>"));
        assert!(briefing.contains("- Issue #42"));
        assert!(briefing.contains("- Issue #7"));
        // Only the trailing five lessons survive.
        assert!(!briefing.contains("lesson 2"));
        assert!(briefing.contains("lesson 3"));
        assert!(briefing.contains("lesson 7"));
    }

    #[test]
    fn handoff_briefing_without_progress_says_so() {
        let briefing = handoff_briefing(&[], &[], &clean_repo(), &[], 1);
        assert!(briefing.contains("None this session"));
        assert!(briefing.contains("None recorded"));
    }

    #[test]
    fn probe_error_renders_error_marker() {
        let repo = RepositoryState::from_error("git failed");
        let briefing = initial_briefing(&[], &repo, None);
        assert!(briefing.contains("<error>git failed</error>"));
        assert!(!briefing.contains("<branch>"));
    }
}
