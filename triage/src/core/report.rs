//! Report rendering for iterations and whole sessions.
//!
//! Pure functions from snapshots to markdown. The controller writes each
//! rendered report in a single call, so no partially written report files
//! can exist on disk.

use std::fmt::Write as _;

use crate::core::types::{
    IterationAnalysis, RepositoryState, SessionRecord, TextGranularity,
};

/// Count invoked tools, preserving first-occurrence order.
fn tool_counts(tools_used: &[String]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for name in tools_used {
        match counts.iter_mut().find(|(seen, _)| seen == name) {
            Some((_, count)) => *count += 1,
            None => counts.push((name.clone(), 1)),
        }
    }
    counts
}

fn format_ids(ids: &[u64]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the record of one iteration.
pub fn iteration_report(
    iteration: u32,
    record: &SessionRecord,
    analysis: &IterationAnalysis,
    repo: &RepositoryState,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Triage Iteration {iteration}");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Started:** {}", record.started_at);
    let _ = writeln!(out, "**Ended:** {}", record.ended_at);
    let granularity = match record.granularity {
        TextGranularity::ToolLevel => "tool-level",
        TextGranularity::Aggregate => "aggregate (plain capture fallback)",
    };
    let _ = writeln!(out, "**Granularity:** {granularity}");
    let _ = writeln!(out);

    let _ = writeln!(out, "## Invocation");
    let _ = writeln!(out);
    let _ = writeln!(out, "- Prompt length: {} chars", record.prompt_len);
    let counts = tool_counts(&record.tools_used);
    if counts.is_empty() {
        let _ = writeln!(out, "- Tools used: none recorded");
    } else {
        let rendered = counts
            .iter()
            .map(|(name, count)| format!("{name} ({count})"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "- Tools used: {rendered}");
    }
    let _ = writeln!(out, "- Captured messages: {}", record.messages.len());
    let _ = writeln!(out);

    let _ = writeln!(out, "## Completion");
    let _ = writeln!(out);
    match &record.completion {
        Some(completion) => {
            if let Some(duration_ms) = completion.duration_ms {
                let _ = writeln!(out, "- Duration: {duration_ms} ms");
            }
            if let Some(cost) = completion.cost_usd {
                let _ = writeln!(out, "- Cost: ${cost:.4}");
            }
            if let Some(turns) = completion.num_turns {
                let _ = writeln!(out, "- Turns: {turns}");
            }
            let _ = writeln!(out, "- Error flag: {}", completion.is_error);
            if let Some(result) = &completion.result {
                let _ = writeln!(out);
                let _ = writeln!(out, "```");
                let _ = writeln!(out, "{result}");
                let _ = writeln!(out, "```");
            }
        }
        None => {
            let _ = writeln!(out, "No completion recorded.");
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Analysis");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- Success: {}",
        if analysis.success { "yes" } else { "no" }
    );
    let _ = writeln!(
        out,
        "- Completed items: {}",
        format_ids(&analysis.completed_items)
    );
    let _ = writeln!(
        out,
        "- Continuation: {}",
        if analysis.needs_continuation {
            "requested"
        } else {
            "not requested"
        }
    );
    if !analysis.commits.is_empty() {
        let _ = writeln!(out, "- Commits:");
        let _ = writeln!(out);
        let _ = writeln!(out, "```");
        for commit in &analysis.commits {
            let _ = writeln!(out, "{commit}");
        }
        let _ = writeln!(out, "```");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Repository");
    let _ = writeln!(out);
    match &repo.error {
        Some(error) => {
            let _ = writeln!(out, "Probe failed: {error}");
        }
        None => {
            let _ = writeln!(out, "- Branch: {}", repo.branch);
            let _ = writeln!(out, "- Status: {}", repo.status);
            let _ = writeln!(out, "- Recent commits:");
            let _ = writeln!(out);
            let _ = writeln!(out, "```");
            let _ = writeln!(out, "{}", repo.recent_commits);
            let _ = writeln!(out, "```");
        }
    }

    if let Some(error) = &record.error {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Errors");
        let _ = writeln!(out);
        let _ = writeln!(out, "```");
        let _ = writeln!(out, "{error}");
        let _ = writeln!(out, "```");
    }

    out
}

/// Render the summary written on every exit path of a session.
pub fn session_summary(
    session_start: &str,
    session_end: &str,
    iterations: u32,
    repo: &RepositoryState,
    report_files: &[String],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Triage Session Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Session Start:** {session_start}");
    let _ = writeln!(out, "**Session End:** {session_end}");
    let _ = writeln!(out, "**Iterations Completed:** {iterations}");
    let _ = writeln!(out);
    let _ = writeln!(out, "## Git Status");
    let _ = writeln!(out);
    let _ = writeln!(out, "```");
    match &repo.error {
        Some(error) => {
            let _ = writeln!(out, "probe failed: {error}");
        }
        None => {
            let _ = writeln!(out, "{}", repo.recent_commits);
        }
    }
    let _ = writeln!(out, "```");
    let _ = writeln!(out);
    let _ = writeln!(out, "## Reports Generated");
    let _ = writeln!(out);
    if report_files.is_empty() {
        let _ = writeln!(out, "None.");
    } else {
        for file in report_files {
            let _ = writeln!(out, "- {file}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Completion;

    fn record() -> SessionRecord {
        SessionRecord {
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
            ended_at: "2026-01-01T00:05:00+00:00".to_string(),
            prompt_len: 1234,
            tools_used: vec![
                "Read".to_string(),
                "Edit".to_string(),
                "Read".to_string(),
            ],
            messages: vec!["working on it".to_string()],
            completion: Some(Completion {
                duration_ms: Some(300_000),
                cost_usd: Some(1.25),
                num_turns: Some(12),
                is_error: false,
                result: Some("fixed #42".to_string()),
            }),
            error: None,
            granularity: TextGranularity::ToolLevel,
        }
    }

    fn analysis() -> IterationAnalysis {
        IterationAnalysis {
            completed_items: vec![42],
            commits: vec!["abc123 fix: resolve #42".to_string()],
            success: true,
            needs_continuation: true,
        }
    }

    fn repo() -> RepositoryState {
        RepositoryState {
            branch: "main".to_string(),
            recent_commits: "abc123 fix: resolve #42".to_string(),
            status: "(clean)".to_string(),
            error: None,
        }
    }

    #[test]
    fn iteration_report_carries_all_sections() {
        let report = iteration_report(3, &record(), &analysis(), &repo());

        assert!(report.contains("# Triage Iteration 3"));
        assert!(report.contains("Tools used: Read (2), Edit (1)"));
        assert!(report.contains("- Cost: $1.2500"));
        assert!(report.contains("- Success: yes"));
        assert!(report.contains("- Completed items: #42"));
        assert!(report.contains("- Continuation: requested"));
        assert!(report.contains("- Branch: main"));
        assert!(!report.contains("## Errors"));
    }

    #[test]
    fn iteration_report_surfaces_faults() {
        let mut faulted = record();
        faulted.completion = None;
        faulted.error = Some("stream broke".to_string());

        let report = iteration_report(1, &faulted, &analysis(), &repo());
        assert!(report.contains("No completion recorded."));
        assert!(report.contains("## Errors"));
        assert!(report.contains("stream broke"));
    }

    #[test]
    fn session_summary_enumerates_reports() {
        let files = vec![
            "iteration-001-20260101-000000.md".to_string(),
            "iteration-002-20260101-001000.md".to_string(),
        ];
        let summary = session_summary(
            "2026-01-01T00:00:00+00:00",
            "2026-01-01T00:20:00+00:00",
            2,
            &repo(),
            &files,
        );

        assert!(summary.contains("**Iterations Completed:** 2"));
        assert!(summary.contains("- iteration-001-20260101-000000.md"));
        assert!(summary.contains("- iteration-002-20260101-001000.md"));
    }

    #[test]
    fn session_summary_with_no_reports() {
        let summary = session_summary("a", "b", 0, &RepositoryState::from_error("x"), &[]);
        assert!(summary.contains("**Iterations Completed:** 0"));
        assert!(summary.contains("None."));
        assert!(summary.contains("probe failed: x"));
    }
}
