//! Loop configuration stored as `triage.toml` in the target repository.
//!
//! This file is intended to be edited by humans and must remain stable and
//! automatable. Missing fields default to sensible values; a missing file
//! means all defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Loop configuration (TOML).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TriageConfig {
    /// Reports directory, relative to the target repository root.
    pub reports_dir: String,

    /// How many open work items to fetch per backlog snapshot.
    pub issue_limit: usize,

    /// How many commit one-liners a repository snapshot carries.
    pub recent_commit_count: usize,

    /// Text fragments at or above this many characters are discarded whole
    /// during streaming capture, not truncated-and-kept.
    pub text_capture_ceiling: usize,

    /// Captured fragments store at most this many characters.
    pub text_capture_prefix: usize,

    /// Combined-output capture limit (characters) on the fallback path.
    pub aggregate_capture_chars: usize,

    /// Completion result text is clipped to this many characters.
    pub result_clip: usize,

    /// Raw process output kept in memory, in bytes.
    pub output_limit_bytes: usize,

    /// How many trailing captured messages become handoff lessons.
    pub lessons_tail: usize,

    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable to invoke.
    pub command: String,

    /// Tool allow-list passed to the agent.
    pub allowed_tools: Vec<String>,

    /// Edit-permission mode passed to the agent.
    pub permission_mode: String,

    /// Prefer the streaming integration; the plain-capture fallback is used
    /// when this is off or the streaming spawn fails.
    pub streaming: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            allowed_tools: [
                "Read", "Edit", "Write", "Bash", "Glob", "Grep", "Task", "TodoWrite",
            ]
            .map(str::to_string)
            .to_vec(),
            permission_mode: "acceptEdits".to_string(),
            streaming: true,
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            reports_dir: ".claude/triage-reports".to_string(),
            issue_limit: 20,
            recent_commit_count: 5,
            text_capture_ceiling: 2000,
            text_capture_prefix: 500,
            aggregate_capture_chars: 5000,
            result_clip: 1000,
            output_limit_bytes: 100_000,
            lessons_tail: 3,
            agent: AgentConfig::default(),
        }
    }
}

impl TriageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reports_dir.trim().is_empty() {
            return Err(anyhow!("reports_dir must not be empty"));
        }
        if self.issue_limit == 0 {
            return Err(anyhow!("issue_limit must be > 0"));
        }
        if self.text_capture_ceiling == 0 || self.text_capture_prefix == 0 {
            return Err(anyhow!("text capture limits must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.agent.command.trim().is_empty() {
            return Err(anyhow!("agent.command must not be empty"));
        }
        if self.agent.permission_mode.trim().is_empty() {
            return Err(anyhow!("agent.permission_mode must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TriageConfig::default()`.
pub fn load_config(path: &Path) -> Result<TriageConfig> {
    if !path.exists() {
        let cfg = TriageConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TriageConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
