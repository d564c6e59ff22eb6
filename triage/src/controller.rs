//! Session control loop for automated issue triage.
//!
//! One [`SessionController`] instance owns a run: it loads or synthesizes a
//! briefing, drives strictly serial agent invocations, analyzes each
//! outcome, persists reports and the next handoff checkpoint, and stops on
//! a bounded set of conditions. The iteration counter only moves forward,
//! and every exit path writes a session summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::core::analysis::analyze;
use crate::core::prompt;
use crate::core::report;
use crate::core::types::{RepositoryState, WorkItem};
use crate::io::agent::{AgentBackend, CaptureLimits, InvocationRequest, run_agent};
use crate::io::config::TriageConfig;
use crate::io::git::{Git, is_git_repo, probe_state};
use crate::io::handoff::HandoffStore;
use crate::io::issues::fetch_open_items;
use crate::io::reports::ReportsDir;

/// Cap on commits scanned for one iteration's delta.
const COMMIT_SCAN_LIMIT: usize = 10;

/// Cooperative stop flag, polled between iterations.
///
/// Setting it never aborts an in-flight invocation; that invocation runs to
/// its own completion or fault, and the loop stops before the next one.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The agent signalled an empty backlog.
    Finished,
    /// The iteration ceiling was reached.
    CeilingReached,
    /// Continuation was requested but no handoff briefing was available.
    MissingHandoff,
    /// A cooperative interruption was observed between iterations.
    Interrupted,
    /// An unrecoverable fault escaped the loop body.
    Fault(String),
}

/// Summary of one controller run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub iterations_run: u32,
    /// Report file names produced this run, in order.
    pub report_files: Vec<String>,
    pub stop: StopReason,
    pub summary_path: PathBuf,
}

/// Per-run options from the process surface.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Target repository; must hold version-control metadata.
    pub repo_path: PathBuf,
    /// Iteration ceiling.
    pub max_iterations: u32,
    /// Suppress report commits.
    pub dry_run: bool,
}

/// Drives the triage loop against one repository.
pub struct SessionController<B: AgentBackend> {
    repo_path: PathBuf,
    max_iterations: u32,
    dry_run: bool,
    config: TriageConfig,
    backend: B,
    git: Git,
    reports: ReportsDir,
    handoff: HandoffStore,
    interrupt: InterruptFlag,
    iteration: u32,
    session_started_at: String,
    session_stamp: String,
    report_files: Vec<String>,
}

impl<B: AgentBackend> SessionController<B> {
    /// Build a controller for one run.
    ///
    /// Fails fast when the repository path carries no version-control
    /// metadata or the configuration is invalid; no iteration runs after a
    /// configuration fault.
    pub fn new(options: ControllerOptions, config: TriageConfig, backend: B) -> Result<Self> {
        config.validate()?;
        if !is_git_repo(&options.repo_path) {
            return Err(anyhow!(
                "{} is not a git repository",
                options.repo_path.display()
            ));
        }

        let reports = ReportsDir::new(options.repo_path.join(&config.reports_dir));
        reports.ensure()?;
        let handoff = HandoffStore::new(reports.path());
        let git = Git::new(&options.repo_path);
        let now = Utc::now();

        Ok(Self {
            repo_path: options.repo_path,
            max_iterations: options.max_iterations,
            dry_run: options.dry_run,
            config,
            backend,
            git,
            reports,
            handoff,
            interrupt: InterruptFlag::new(),
            iteration: 0,
            session_started_at: now.to_rfc3339(),
            session_stamp: now.format("%Y%m%d-%H%M%S").to_string(),
            report_files: Vec::new(),
        })
    }

    /// Shared handle for requesting a cooperative stop.
    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    /// Run the loop to a stop condition.
    ///
    /// The session moves from idle through running-iteration and
    /// awaiting-continuation passes until it stops; faults inside the loop
    /// body halt immediately with no retry. Every exit path, including
    /// faults and interruptions, writes the session summary before
    /// returning.
    #[instrument(skip_all, fields(max_iterations = self.max_iterations))]
    pub fn run(&mut self) -> Result<SessionOutcome> {
        info!(
            repo = %self.repo_path.display(),
            dry_run = self.dry_run,
            "triage session started"
        );

        let stop = self.drive();
        let summary_path = self.write_summary()?;

        match &stop {
            StopReason::Finished => info!("session finished: backlog reported empty"),
            StopReason::CeilingReached => info!(
                ceiling = self.max_iterations,
                "session stopped at iteration ceiling"
            ),
            StopReason::MissingHandoff => {
                warn!("session stopped: no handoff briefing for the next iteration");
            }
            StopReason::Interrupted => warn!("session interrupted"),
            StopReason::Fault(err) => error!(err = %err, "session halted on fault"),
        }

        Ok(SessionOutcome {
            iterations_run: self.iteration,
            report_files: self.report_files.clone(),
            stop,
            summary_path,
        })
    }

    /// Entry plus loop body; converts every failure into a [`StopReason`]
    /// so the caller can still write the session summary.
    fn drive(&mut self) -> StopReason {
        let mut briefing = match self.handoff.load() {
            Ok(Some(text)) => {
                info!("resuming from persisted handoff briefing");
                text
            }
            Ok(None) => {
                debug!("no handoff checkpoint, synthesizing initial briefing");
                let backlog = self.fetch_backlog();
                let repo = self.probe();
                prompt::initial_briefing(&backlog, &repo, None)
            }
            Err(err) => return StopReason::Fault(format!("{err:#}")),
        };

        loop {
            if self.iteration >= self.max_iterations {
                return StopReason::CeilingReached;
            }
            if self.interrupt.is_set() {
                return StopReason::Interrupted;
            }

            let needs_continuation = self.run_iteration(&briefing);

            if !needs_continuation {
                return StopReason::Finished;
            }

            briefing = match self.handoff.load() {
                Ok(Some(next)) => next,
                Ok(None) => return StopReason::MissingHandoff,
                Err(err) => return StopReason::Fault(format!("{err:#}")),
            };
        }
    }

    /// One pass: invoke, analyze, report, checkpoint, commit.
    ///
    /// Returns the continuation decision. Agent faults never surface here,
    /// they live inside the record; persistence failures are logged as
    /// warnings because forward progress beats a written artifact.
    #[instrument(skip_all, fields(iteration = self.iteration + 1))]
    fn run_iteration(&mut self, briefing: &str) -> bool {
        self.iteration += 1;
        let iteration = self.iteration;
        info!(iteration, "iteration started");

        let request = InvocationRequest {
            workdir: self.repo_path.clone(),
            briefing: briefing.to_string(),
            allowed_tools: self.config.agent.allowed_tools.clone(),
            permission_mode: self.config.agent.permission_mode.clone(),
            output_limit_bytes: self.config.output_limit_bytes,
        };
        let record = run_agent(&self.backend, &request, self.capture_limits());
        if let Some(err) = &record.error {
            warn!(iteration, err = %err, "agent invocation recorded an error");
        }

        let commits = match self.git.log_since(&record.started_at, COMMIT_SCAN_LIMIT) {
            Ok(commits) => commits,
            Err(err) => {
                warn!(err = format!("{err:#}"), "commit delta unavailable");
                Vec::new()
            }
        };
        let analysis = analyze(&record, &commits);
        debug!(
            success = analysis.success,
            completed = analysis.completed_items.len(),
            needs_continuation = analysis.needs_continuation,
            "iteration analyzed"
        );

        let repo_state = self.probe();
        let rendered = report::iteration_report(iteration, &record, &analysis, &repo_state);
        let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let report_path = self.reports.iteration_report_path(iteration, &stamp);
        match self.reports.write(&report_path, &rendered) {
            Ok(()) => {
                if let Some(name) = report_path.file_name() {
                    self.report_files.push(name.to_string_lossy().into_owned());
                }
                info!(iteration, report = %report_path.display(), "iteration report written");
            }
            Err(err) => {
                warn!(err = format!("{err:#}"), "could not write iteration report");
            }
        }

        if analysis.needs_continuation {
            let tail_start = record
                .messages
                .len()
                .saturating_sub(self.config.lessons_tail);
            let next = prompt::handoff_briefing(
                &analysis.completed_items,
                &self.fetch_backlog(),
                &self.probe(),
                &record.messages[tail_start..],
                iteration,
            );
            if let Err(err) = self.handoff.save(&next) {
                warn!(err = format!("{err:#}"), "could not save handoff checkpoint");
            }
        }

        self.commit_reports(iteration);
        analysis.needs_continuation
    }

    fn capture_limits(&self) -> CaptureLimits {
        CaptureLimits {
            text_ceiling: self.config.text_capture_ceiling,
            text_prefix: self.config.text_capture_prefix,
            aggregate_clip: self.config.aggregate_capture_chars,
            result_clip: self.config.result_clip,
        }
    }

    fn probe(&self) -> RepositoryState {
        probe_state(&self.git, self.config.recent_commit_count)
    }

    fn fetch_backlog(&self) -> Vec<WorkItem> {
        fetch_open_items(&self.repo_path, self.config.issue_limit)
    }

    /// Checkpoint report artifacts as a single commit tagged with the
    /// iteration number. Failure (including nothing to commit) is a
    /// warning, never an error: forward progress beats commit success.
    fn commit_reports(&self, iteration: u32) {
        if self.dry_run {
            info!(iteration, "dry run, skipping report commit");
            return;
        }
        let message = format!("docs: triage iteration {iteration} report");
        let result = self
            .git
            .add_path(self.reports.path())
            .and_then(|()| self.git.commit_staged(&message));
        match result {
            Ok(true) => info!(%message, "committed report artifacts"),
            Ok(false) => debug!("no report changes to commit"),
            Err(err) => {
                warn!(err = format!("{err:#}"), "could not commit report artifacts");
            }
        };
    }

    fn write_summary(&self) -> Result<PathBuf> {
        let summary = report::session_summary(
            &self.session_started_at,
            &Utc::now().to_rfc3339(),
            self.iteration,
            &self.probe(),
            &self.report_files,
        );
        let path = self.reports.summary_path(&self.session_stamp);
        self.reports.write(&path, &summary)?;
        info!(path = %path.display(), "session summary written");
        Ok(path)
    }
}
