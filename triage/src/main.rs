//! Automated issue triage loop.
//!
//! Repeatedly invokes a coding agent against the open-issue backlog of a
//! repository, carrying context across invocations through a persisted
//! handoff briefing under the reports directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use triage_runner::controller::{ControllerOptions, SessionController, StopReason};
use triage_runner::io::agent::CliAgentBackend;
use triage_runner::io::config::load_config;
use triage_runner::logging;

#[derive(Parser)]
#[command(
    name = "triage-runner",
    version,
    about = "Automated issue triage loop driving a coding agent"
)]
struct Cli {
    /// Maximum iterations to run.
    #[arg(long, default_value_t = 10)]
    max_iterations: u32,

    /// Analyze and report without committing artifacts.
    #[arg(long)]
    dry_run: bool,

    /// Path to the target repository.
    #[arg(long, default_value = ".")]
    repo_path: PathBuf,

    /// Path to a TOML config file (defaults to `triage.toml` in the target
    /// repository).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let repo_path = cli
        .repo_path
        .canonicalize()
        .with_context(|| format!("resolve repo path {}", cli.repo_path.display()))?;
    let config_path = cli
        .config
        .unwrap_or_else(|| repo_path.join("triage.toml"));
    let config = load_config(&config_path)?;

    let backend = CliAgentBackend::new(&config.agent.command, config.agent.streaming);
    let options = ControllerOptions {
        repo_path,
        max_iterations: cli.max_iterations,
        dry_run: cli.dry_run,
    };
    let mut controller = SessionController::new(options, config, backend)?;
    let outcome = controller.run()?;

    println!(
        "session stopped after {} iteration(s): {}",
        outcome.iterations_run,
        describe_stop(&outcome.stop)
    );
    println!("summary: {}", outcome.summary_path.display());
    Ok(())
}

fn describe_stop(stop: &StopReason) -> String {
    match stop {
        StopReason::Finished => "backlog reported empty".to_string(),
        StopReason::CeilingReached => "iteration ceiling reached".to_string(),
        StopReason::MissingHandoff => "no handoff briefing available".to_string(),
        StopReason::Interrupted => "interrupted".to_string(),
        StopReason::Fault(err) => format!("fault: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let cli = Cli::parse_from(["triage-runner"]);
        assert_eq!(cli.max_iterations, 10);
        assert!(!cli.dry_run);
        assert_eq!(cli.repo_path, PathBuf::from("."));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_flags() {
        let cli = Cli::parse_from([
            "triage-runner",
            "--max-iterations",
            "3",
            "--dry-run",
            "--repo-path",
            "/tmp/repo",
        ]);
        assert_eq!(cli.max_iterations, 3);
        assert!(cli.dry_run);
        assert_eq!(cli.repo_path, PathBuf::from("/tmp/repo"));
    }

    #[test]
    fn describes_stop_reasons() {
        assert_eq!(
            describe_stop(&StopReason::Finished),
            "backlog reported empty"
        );
        assert_eq!(
            describe_stop(&StopReason::Fault("boom".to_string())),
            "fault: boom"
        );
    }
}
