//! CLI commands

mod approve;
mod context;
mod prs;
mod status;
pub mod style;
mod watch;

pub use approve::{ApproveOptions, run_approve_merge};
pub use context::GlobalArgs;
pub use prs::run_prs;
pub use status::run_status;
pub use watch::{WatchArgs, run_watch};

use qas_gate::types::{RunState, WatchResult, WatchStatus};
use style::{Stylize, check, cross};

/// One-line rendering of a watch result for the terminal
pub(crate) fn format_result(name: &str, result: &WatchResult) -> String {
    let (mark, outcome) = match (result.status, result.run.as_ref()) {
        (WatchStatus::TimedOut, Some(run)) => (
            "⏳".to_string(),
            format!("timed out while {}", run.state).warn(),
        ),
        (WatchStatus::TimedOut, None) => ("⏳".to_string(), "timed out, no run observed".warn()),
        (_, None) => ("?".muted(), "no pipeline run found".muted()),
        (_, Some(run)) => match run.state {
            RunState::Succeeded if run.partially_succeeded => {
                ("~".warn(), "partially succeeded".warn())
            }
            RunState::Succeeded => (check(), "succeeded".success()),
            RunState::Failed => (cross(), "failed".error()),
            RunState::Canceled => ("!".warn(), "canceled".warn()),
            RunState::Queued | RunState::Running => {
                ("…".accent(), run.state.to_string().accent())
            }
        },
    };

    let mut line = format!("{mark} {}: {outcome}", name.emphasis());
    if let Some(ref run) = result.run {
        let number = run
            .build_number
            .clone()
            .unwrap_or_else(|| run.run_id.to_string());
        line.push_str(&format!(" {}", format!("(build {number})").muted()));
        if let Some(ref url) = run.url {
            line.push_str(&format!("\n    {}", url.muted()));
        }
    }
    if let Some(ref error) = result.last_error {
        line.push_str(&format!("\n    {} {}", "last error:".muted(), error.muted()));
    }
    line
}
