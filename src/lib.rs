//! qas-gate: approve and merge promotion PRs, then watch their pipelines
//!
//! Release promotion on Azure DevOps moves changes into a `qas` branch through
//! pull requests. This crate approves and completes those PRs across a set of
//! repositories, then watches the pipeline runs they trigger and posts one
//! summary to a Teams channel.
//!
//! The pieces are layered:
//! - [`gate`]: pure eligibility filtering and per-PR approve-then-merge
//! - [`watch`]: the polling loop with deadline and cancellation
//! - [`notify`]: summary formatting and best-effort delivery
//! - [`platform`]: the repository client seam and its Azure DevOps adapter
//! - [`orchestrator`]: the facade composing them

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod notify;
pub mod orchestrator;
pub mod platform;
pub mod types;
pub mod watch;
