//! I/O adapters for the triage loop.

pub mod agent;
pub mod config;
pub mod git;
pub mod handoff;
pub mod issues;
pub mod process;
pub mod reports;
