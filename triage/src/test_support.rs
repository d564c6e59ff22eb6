//! Test-only helpers: scripted agent backends and throwaway git repos.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

use crate::core::types::{Completion, TextGranularity};
use crate::io::agent::{AgentBackend, AgentEvent, EventStream, InvocationRequest};

/// One scripted element of an event stream.
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Event(AgentEvent),
    /// Yield an error at this point in the stream.
    Fail(String),
}

/// Predetermined outcome for one `invoke` call.
#[derive(Debug, Clone)]
pub struct ScriptedInvocation {
    pub granularity: TextGranularity,
    pub events: Vec<ScriptedEvent>,
    pub spawn_error: Option<String>,
}

impl ScriptedInvocation {
    pub fn events(events: Vec<ScriptedEvent>) -> Self {
        Self {
            granularity: TextGranularity::ToolLevel,
            events,
            spawn_error: None,
        }
    }

    /// Fail the invocation itself, before any event is produced.
    pub fn spawn_error(message: &str) -> Self {
        Self {
            granularity: TextGranularity::ToolLevel,
            events: Vec::new(),
            spawn_error: Some(message.to_string()),
        }
    }

    /// A clean completion whose result text requests another iteration.
    pub fn continuing() -> Self {
        Self::events(vec![
            ScriptedEvent::Event(AgentEvent::Text {
                text: "picked the next issue".to_string(),
            }),
            ScriptedEvent::Event(AgentEvent::Completed(Completion {
                duration_ms: Some(1000),
                cost_usd: Some(0.1),
                num_turns: Some(2),
                is_error: false,
                result: Some("continuing with the backlog".to_string()),
            })),
        ])
    }

    /// A clean completion whose result text contains the stop phrase.
    pub fn finished() -> Self {
        Self::events(vec![ScriptedEvent::Event(AgentEvent::Completed(
            Completion {
                duration_ms: Some(1000),
                cost_usd: Some(0.1),
                num_turns: Some(1),
                is_error: false,
                result: Some("No more issues to process.".to_string()),
            },
        ))])
    }

    /// An error-flagged completion.
    pub fn errored() -> Self {
        Self::events(vec![ScriptedEvent::Event(AgentEvent::Completed(
            Completion {
                duration_ms: Some(1000),
                cost_usd: None,
                num_turns: Some(1),
                is_error: true,
                result: Some("hit a wall".to_string()),
            },
        ))])
    }
}

/// Backend returning scripted invocations in order, without spawning
/// processes.
pub struct ScriptedAgentBackend {
    invocations: Mutex<VecDeque<ScriptedInvocation>>,
}

impl ScriptedAgentBackend {
    pub fn new(invocations: Vec<ScriptedInvocation>) -> Self {
        Self {
            invocations: Mutex::new(invocations.into()),
        }
    }
}

impl AgentBackend for ScriptedAgentBackend {
    fn invoke(&self, _request: &InvocationRequest) -> Result<EventStream> {
        let invocation = self
            .invocations
            .lock()
            .expect("scripted invocations lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted backend exhausted"))?;

        if let Some(message) = invocation.spawn_error {
            return Err(anyhow!(message));
        }

        let events = invocation.events.into_iter().map(|event| match event {
            ScriptedEvent::Event(event) => Ok(event),
            ScriptedEvent::Fail(message) => Err(anyhow!(message)),
        });
        Ok(EventStream {
            granularity: invocation.granularity,
            events: Box::new(events.collect::<Vec<_>>().into_iter()),
        })
    }
}

/// A real git repository in a temp directory, with one initial commit.
pub struct TestRepo {
    temp: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { temp };
        repo.git(&["init", "-q", "-b", "main"])?;
        repo.git(&["config", "user.email", "triage@example.com"])?;
        repo.git(&["config", "user.name", "triage"])?;
        repo.commit_file("README.md", "# test repo\n", "initial commit")?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Write a file and commit it with the given message.
    pub fn commit_file(&self, name: &str, contents: &str, message: &str) -> Result<()> {
        fs::write(self.root().join(name), contents)
            .with_context(|| format!("write {name}"))?;
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Number of commits on the current branch.
    pub fn commit_count(&self) -> Result<usize> {
        let output = Command::new("git")
            .args(["rev-list", "--count", "HEAD"])
            .current_dir(self.root())
            .output()
            .context("spawn git rev-list")?;
        let count = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<usize>()
            .context("parse commit count")?;
        Ok(count)
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.root())
            .status()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !status.success() {
            return Err(anyhow!("git {} failed", args.join(" ")));
        }
        Ok(())
    }
}
