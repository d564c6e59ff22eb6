//! Agent invocation and session capture.
//!
//! The [`AgentBackend`] trait decouples the loop from the actual agent
//! integration. The real backend drives the agent CLI: the primary path
//! parses its JSONL event stream lazily, one event at a time; when the
//! streaming spawn fails, a degraded path pipes the briefing to a plain
//! non-interactive invocation and captures combined output without
//! tool-level granularity. Tests use scripted backends that return
//! predetermined events without spawning processes.
//!
//! Faults raised anywhere during an invocation are captured into the
//! resulting [`SessionRecord`]'s error field, never propagated; the
//! controller treats an errored record as "needs continuation".

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{Completion, SessionRecord, TextGranularity, clip_chars};
use crate::io::process::{join_output, read_stream_limited, run_command};

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Briefing text piped to the agent.
    pub briefing: String,
    /// Tool allow-list.
    pub allowed_tools: Vec<String>,
    /// Edit-permission mode.
    pub permission_mode: String,
    /// Raw process output kept in memory, in bytes.
    pub output_limit_bytes: usize,
}

/// One observed event from a running agent session.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The agent invoked a tool.
    ToolUse { name: String },
    /// The agent emitted a text fragment.
    Text { text: String },
    /// Terminal completion; ends the stream.
    Completed(Completion),
}

/// Lazily produced events plus how much detail the backend could observe.
pub struct EventStream {
    pub granularity: TextGranularity,
    pub events: Box<dyn Iterator<Item = Result<AgentEvent>>>,
}

/// Abstraction over agent integrations.
pub trait AgentBackend {
    /// Start one invocation and return its event stream.
    fn invoke(&self, request: &InvocationRequest) -> Result<EventStream>;
}

/// Capture limits applied while classifying events.
#[derive(Debug, Clone, Copy)]
pub struct CaptureLimits {
    /// Streaming text fragments at or above this many characters are
    /// discarded whole, not truncated-and-kept.
    pub text_ceiling: usize,
    /// Captured fragments store at most this many characters.
    pub text_prefix: usize,
    /// Combined-output capture limit (characters) on the fallback path.
    pub aggregate_clip: usize,
    /// Completion result text is clipped to this many characters.
    pub result_clip: usize,
}

/// Run one agent invocation to completion and capture it.
///
/// Consumes the event stream in arrival order: tool invocations record the
/// tool name, text fragments are captured subject to `limits`, and the
/// terminal completion ends the stream. Start/end timestamps are always
/// populated, and any fault lands in the record's error field.
#[instrument(skip_all, fields(workdir = %request.workdir.display()))]
pub fn run_agent<B: AgentBackend>(
    backend: &B,
    request: &InvocationRequest,
    limits: CaptureLimits,
) -> SessionRecord {
    let mut record = SessionRecord {
        started_at: Utc::now().to_rfc3339(),
        ended_at: String::new(),
        prompt_len: request.briefing.chars().count(),
        tools_used: Vec::new(),
        messages: Vec::new(),
        completion: None,
        error: None,
        granularity: TextGranularity::ToolLevel,
    };

    match backend.invoke(request) {
        Ok(stream) => {
            record.granularity = stream.granularity;
            for event in stream.events {
                match event {
                    Ok(AgentEvent::ToolUse { name }) => record.tools_used.push(name),
                    Ok(AgentEvent::Text { text }) => match record.granularity {
                        TextGranularity::ToolLevel => {
                            if text.chars().count() < limits.text_ceiling {
                                record.messages.push(clip_chars(&text, limits.text_prefix));
                            }
                        }
                        TextGranularity::Aggregate => {
                            record
                                .messages
                                .push(clip_chars(&text, limits.aggregate_clip));
                        }
                    },
                    Ok(AgentEvent::Completed(mut completion)) => {
                        completion.result = completion
                            .result
                            .map(|result| clip_chars(&result, limits.result_clip));
                        record.completion = Some(completion);
                        break;
                    }
                    Err(err) => {
                        record.error = Some(format!("{err:#}"));
                        break;
                    }
                }
            }
        }
        Err(err) => record.error = Some(format!("{err:#}")),
    }

    record.ended_at = Utc::now().to_rfc3339();
    debug!(
        tools = record.tools_used.len(),
        messages = record.messages.len(),
        errored = record.error.is_some(),
        "agent session captured"
    );
    record
}

/// Backend driving the agent CLI as a child process.
pub struct CliAgentBackend {
    command: String,
    streaming: bool,
}

impl CliAgentBackend {
    pub fn new(command: impl Into<String>, streaming: bool) -> Self {
        Self {
            command: command.into(),
            streaming,
        }
    }

    fn base_command(&self, request: &InvocationRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--print")
            .arg("--permission-mode")
            .arg(&request.permission_mode)
            .arg("--allowedTools")
            .arg(request.allowed_tools.join(","))
            .current_dir(&request.workdir);
        cmd
    }

    /// Primary path: spawn with JSONL streaming and parse events lazily.
    #[instrument(skip_all)]
    fn spawn_streaming(&self, request: &InvocationRequest) -> Result<EventStream> {
        let mut cmd = self.base_command(request);
        cmd.arg("--verbose")
            .arg("--output-format")
            .arg("stream-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(command = %self.command, "starting agent (streaming)");
        let mut child = cmd.spawn().context("spawn agent (streaming)")?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        stdin
            .write_all(request.briefing.as_bytes())
            .context("write briefing to agent")?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;
        let limit = request.output_limit_bytes;
        let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

        Ok(EventStream {
            granularity: TextGranularity::ToolLevel,
            events: Box::new(StreamEvents::new(child, stdout, stderr_handle)),
        })
    }

    /// Degraded path: plain non-interactive invocation, combined output
    /// captured up to a bound, no tool-level granularity.
    #[instrument(skip_all)]
    fn run_plain(&self, request: &InvocationRequest) -> Result<EventStream> {
        info!(command = %self.command, "starting agent (plain capture)");
        let cmd = self.base_command(request);
        let output = run_command(
            cmd,
            Some(request.briefing.as_bytes()),
            request.output_limit_bytes,
        )
        .context("run agent (plain capture)")?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&output.stdout_truncated_notice("agent"));
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            combined.push('\n');
            combined.push_str(stderr.trim());
            combined.push_str(&output.stderr_truncated_notice("agent"));
        }

        let completion = Completion {
            duration_ms: None,
            cost_usd: None,
            num_turns: None,
            is_error: !output.status.success(),
            result: None,
        };

        let events = vec![
            Ok(AgentEvent::Text { text: combined }),
            Ok(AgentEvent::Completed(completion)),
        ];
        Ok(EventStream {
            granularity: TextGranularity::Aggregate,
            events: Box::new(events.into_iter()),
        })
    }
}

impl AgentBackend for CliAgentBackend {
    fn invoke(&self, request: &InvocationRequest) -> Result<EventStream> {
        if self.streaming {
            match self.spawn_streaming(request) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    warn!(
                        err = format!("{err:#}"),
                        "streaming agent unavailable, falling back to plain capture"
                    );
                }
            }
        }
        self.run_plain(request)
    }
}

/// Lazy JSONL event parser over the agent's stdout.
///
/// The child process is reaped exactly once, either when the stream drains
/// or when the consumer drops the iterator after a terminal event.
struct StreamEvents {
    child: Option<Child>,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_handle: Option<thread::JoinHandle<Result<(Vec<u8>, usize)>>>,
    pending: VecDeque<AgentEvent>,
    saw_completion: bool,
    done: bool,
}

impl StreamEvents {
    fn new(
        child: Child,
        stdout: ChildStdout,
        stderr_handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>,
    ) -> Self {
        Self {
            child: Some(child),
            lines: BufReader::new(stdout).lines(),
            stderr_handle: Some(stderr_handle),
            pending: VecDeque::new(),
            saw_completion: false,
            done: false,
        }
    }

    /// Wait for the child and surface a non-zero exit as an error unless a
    /// terminal completion already explained the session's end.
    fn finish(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        // Drain remaining stdout so the child can never block on a full
        // pipe while we wait for it to exit.
        for line in self.lines.by_ref() {
            if line.is_err() {
                break;
            }
        }
        let status = child.wait().context("wait for agent process")?;
        let stderr_excerpt = match self.stderr_handle.take() {
            Some(handle) => match join_output(handle) {
                Ok((bytes, _truncated)) => {
                    clip_chars(String::from_utf8_lossy(&bytes).trim(), 1000)
                }
                Err(_) => String::new(),
            },
            None => String::new(),
        };
        if !status.success() && !self.saw_completion {
            return Err(anyhow!(
                "agent exited with status {:?}: {}",
                status.code(),
                stderr_excerpt
            ));
        }
        Ok(())
    }
}

impl Iterator for StreamEvents {
    type Item = Result<AgentEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return match self.finish() {
                    Ok(()) => None,
                    Err(err) => Some(Err(err)),
                };
            }
            match self.lines.next() {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_stream_line(&line) {
                        Ok(events) => {
                            if events
                                .iter()
                                .any(|event| matches!(event, AgentEvent::Completed(_)))
                            {
                                self.saw_completion = true;
                                self.done = true;
                            }
                            self.pending.extend(events);
                        }
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(anyhow!(err).context("read agent stream")));
                }
                None => {
                    self.done = true;
                }
            }
        }
    }
}

impl Drop for StreamEvents {
    fn drop(&mut self) {
        // Reap the child if the consumer stopped early (terminal event).
        let _ = self.finish();
    }
}

/// Classify one JSONL line into zero or more events.
///
/// Assistant messages carry `tool_use` and `text` content blocks; the
/// `result` message is terminal. Other event types (system, user) are
/// ignored.
fn parse_stream_line(line: &str) -> Result<Vec<AgentEvent>> {
    let value: Value = serde_json::from_str(line).context("parse agent event")?;
    match value.get("type").and_then(Value::as_str) {
        Some("assistant") => {
            let mut events = Vec::new();
            if let Some(blocks) = value
                .pointer("/message/content")
                .and_then(Value::as_array)
            {
                for block in blocks {
                    match block.get("type").and_then(Value::as_str) {
                        Some("tool_use") => {
                            if let Some(name) = block.get("name").and_then(Value::as_str) {
                                events.push(AgentEvent::ToolUse {
                                    name: name.to_string(),
                                });
                            }
                        }
                        Some("text") => {
                            if let Some(text) = block.get("text").and_then(Value::as_str) {
                                events.push(AgentEvent::Text {
                                    text: text.to_string(),
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(events)
        }
        Some("result") => {
            let completion = Completion {
                duration_ms: value.get("duration_ms").and_then(Value::as_u64),
                cost_usd: value.get("total_cost_usd").and_then(Value::as_f64),
                num_turns: value
                    .get("num_turns")
                    .and_then(Value::as_u64)
                    .map(|turns| turns as u32),
                is_error: value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                result: value
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            };
            Ok(vec![AgentEvent::Completed(completion)])
        }
        _ => Ok(Vec::new()),
    }
}
