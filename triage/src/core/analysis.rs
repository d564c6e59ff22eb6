//! Pure analysis of one iteration's outcome.
//!
//! Given the session record and the commits created since the invocation
//! started, derive what was accomplished and whether another iteration is
//! warranted. Everything here is deterministic and free of I/O.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{IterationAnalysis, SessionRecord};

/// Phrase in the agent's final result text that signals an empty backlog.
///
/// This is a deliberately weak termination signal: a case-insensitive
/// substring match, with no stronger "done" contract defined by the agent.
/// Ambiguity resolves to continuation, since a false stop costs a missed
/// backlog item while a false continuation only costs one extra iteration.
pub const STOP_PHRASE: &str = "no more issues";

static ITEM_REF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\d+)").unwrap());

/// Extract `#<digits>` work-item references from commit subject lines.
///
/// Returns ids in first-occurrence order, de-duplicated. Matching free-text
/// commit messages is a heuristic; ids the agent mentioned without fixing
/// will show up here too.
pub fn extract_item_refs<'a, I>(subjects: I) -> Vec<u64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut refs = Vec::new();
    for subject in subjects {
        for caps in ITEM_REF_RE.captures_iter(subject) {
            if let Ok(number) = caps[1].parse::<u64>()
                && !refs.contains(&number)
            {
                refs.push(number);
            }
        }
    }
    refs
}

/// Derive an [`IterationAnalysis`] from a session record and the commits
/// created at or after the record's start timestamp.
///
/// Success means at least one qualifying commit exists. Continuation
/// defaults to true; an error-flagged completion forces it, and only a
/// clean completion whose result text contains [`STOP_PHRASE`] clears it.
pub fn analyze(record: &SessionRecord, commits_since_start: &[String]) -> IterationAnalysis {
    let success = !commits_since_start.is_empty();
    let completed_items = extract_item_refs(commits_since_start.iter().map(String::as_str));

    let mut needs_continuation = true;
    if let Some(completion) = &record.completion
        && !completion.is_error
        && let Some(result) = &completion.result
        && result.to_lowercase().contains(STOP_PHRASE)
    {
        needs_continuation = false;
    }

    IterationAnalysis {
        completed_items,
        commits: commits_since_start.to_vec(),
        success,
        needs_continuation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Completion, TextGranularity};

    fn record_with_completion(is_error: bool, result: Option<&str>) -> SessionRecord {
        SessionRecord {
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
            ended_at: "2026-01-01T00:05:00+00:00".to_string(),
            prompt_len: 100,
            tools_used: Vec::new(),
            messages: Vec::new(),
            completion: Some(Completion {
                duration_ms: Some(1000),
                cost_usd: Some(0.5),
                num_turns: Some(3),
                is_error,
                result: result.map(str::to_string),
            }),
            error: None,
            granularity: TextGranularity::ToolLevel,
        }
    }

    #[test]
    fn extracts_refs_in_first_occurrence_order_deduplicated() {
        let subjects = [
            "abc123 fix: resolve #42",
            "def456 fix: resolve #42 and #7",
        ];
        assert_eq!(extract_item_refs(subjects), vec![42, 7]);
    }

    #[test]
    fn extracts_nothing_from_plain_subjects() {
        assert_eq!(
            extract_item_refs(["chore: bump deps", "docs: readme"]),
            Vec::<u64>::new()
        );
    }

    #[test]
    fn commits_imply_success_and_completed_ids() {
        let record = record_with_completion(false, Some("fixed two issues"));
        let commits = vec![
            "abc123 fix: resolve #42".to_string(),
            "def456 fix: resolve #42 and #7".to_string(),
        ];

        let analysis = analyze(&record, &commits);
        assert!(analysis.success);
        assert_eq!(analysis.completed_items, vec![42, 7]);
        assert!(analysis.needs_continuation);
    }

    #[test]
    fn empty_commit_log_means_no_success() {
        let record = record_with_completion(false, Some("investigated only"));
        let analysis = analyze(&record, &[]);
        assert!(!analysis.success);
        assert!(analysis.completed_items.is_empty());
    }

    #[test]
    fn stop_phrase_clears_continuation_case_insensitively() {
        let record = record_with_completion(false, Some("Done: NO MORE ISSUES to triage."));
        let analysis = analyze(&record, &[]);
        assert!(!analysis.needs_continuation);
    }

    #[test]
    fn error_completion_forces_continuation_despite_stop_phrase() {
        let record = record_with_completion(true, Some("no more issues"));
        let analysis = analyze(&record, &[]);
        assert!(analysis.needs_continuation);
    }

    #[test]
    fn missing_completion_defaults_to_continuation() {
        let mut record = record_with_completion(false, None);
        record.completion = None;
        let analysis = analyze(&record, &[]);
        assert!(analysis.needs_continuation);
    }
}
