//! Automated issue triage loop.
//!
//! This crate repeatedly invokes an autonomous coding agent against the
//! open-issue backlog of a repository, carrying context across otherwise
//! independent invocations through a persisted handoff briefing, and
//! recording an auditable trail of what each invocation attempted and
//! accomplished. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (result analysis, briefing and
//!   report rendering). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (git, issue tracker, agent
//!   process, report and handoff persistence). Isolated to enable mocking
//!   in tests.
//!
//! The [`controller`] module coordinates core logic with I/O to implement
//! the bounded session loop.

pub mod controller;
pub mod core;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
