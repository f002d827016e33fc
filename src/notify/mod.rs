//! Watch notifications
//!
//! Summarises watch results into a chat message and delivers it. Delivery is
//! best-effort: failures are logged and never reach the watch outcome.

mod teams;

pub use teams::TeamsNotifier;

use crate::error::Result;
use crate::types::{ErrorKind, RepositoryId, RunState, WatchResult, WatchStatus};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Theme colors (hex, no `#`)
mod color {
    pub const SUCCESS: &str = "2EB886";
    pub const PARTIAL: &str = "FFB900";
    pub const FAILURE: &str = "E81123";
    pub const NEUTRAL: &str = "767676";
    pub const INFO: &str = "0078D7";
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Title line
    pub title: String,
    /// Body lines (markdown)
    pub lines: Vec<String>,
    /// Theme color (hex, no `#`)
    pub color: String,
}

impl Message {
    /// Body text with one paragraph per line
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .filter(|l| !l.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Delivery channel for messages
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message
    async fn send(&self, message: &Message) -> Result<()>;
}

/// Notifier used when no webhook is configured
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, message: &Message) -> Result<()> {
        debug!(title = %message.title, "no webhook configured, notification skipped");
        Ok(())
    }
}

/// Deliver `message`, logging instead of failing
///
/// Returns `Some(ErrorKind::NotificationFailed)` when delivery failed so
/// callers can report it; nothing is raised.
pub async fn notify(notifier: &dyn Notifier, message: &Message) -> Option<ErrorKind> {
    match notifier.send(message).await {
        Ok(()) => {
            info!(title = %message.title, "notification sent");
            None
        }
        Err(e) => {
            warn!(error = %e, "notification failed");
            Some(ErrorKind::NotificationFailed)
        }
    }
}

/// Emoji for a watch result
fn result_emoji(result: &WatchResult) -> &'static str {
    match (result.status, result.run.as_ref()) {
        (WatchStatus::TimedOut, _) => "⏳",
        (_, Some(run)) if run.state == RunState::Succeeded && run.partially_succeeded => "🟡",
        (_, Some(run)) => match run.state {
            RunState::Succeeded => "✅",
            RunState::Failed => "❌",
            RunState::Canceled => "⚠️",
            RunState::Queued | RunState::Running => "🔄",
        },
        (_, None) => "❔",
    }
}

/// Short description of a watch result
fn outcome_text(result: &WatchResult) -> String {
    match (result.status, result.run.as_ref()) {
        (WatchStatus::TimedOut, Some(run)) => format!("timed out while {}", run.state),
        (WatchStatus::TimedOut, None) if result.last_error.is_some() => {
            "timed out (pipeline status unavailable)".to_string()
        }
        (WatchStatus::TimedOut, None) => "timed out, no pipeline started".to_string(),
        (_, Some(run)) if run.state == RunState::Succeeded && run.partially_succeeded => {
            "partially succeeded".to_string()
        }
        (_, Some(run)) => run.state.to_string(),
        (_, None) => "no pipeline run found".to_string(),
    }
}

/// Format a run duration as `XmYs`, or `n/d` when unknown
pub fn duration_text(result: &WatchResult) -> String {
    result
        .run
        .as_ref()
        .and_then(crate::types::PipelineRun::duration)
        .map_or_else(
            || "n/d".to_string(),
            |d| {
                let total = d.num_seconds().max(0);
                format!("{}m{}s", total / 60, total % 60)
            },
        )
}

/// Pick the theme color for a set of results (worst outcome wins)
fn summary_color(results: &[WatchResult]) -> &'static str {
    if results.is_empty() {
        return color::INFO;
    }
    let states: Vec<_> = results.iter().map(|r| (r.status, r.run.as_ref())).collect();
    if states
        .iter()
        .any(|(_, run)| run.is_some_and(|r| r.state == RunState::Failed))
    {
        color::FAILURE
    } else if states.iter().any(|(status, run)| {
        *status != WatchStatus::Resolved || run.is_none_or(|r| r.state == RunState::Canceled)
    }) {
        color::NEUTRAL
    } else if states
        .iter()
        .any(|(_, run)| run.is_some_and(|r| r.partially_succeeded))
    {
        color::PARTIAL
    } else {
        color::SUCCESS
    }
}

/// Build the summary message for a finished watch
///
/// `name` maps repository ids to readable names.
pub fn summary_message(
    results: &[WatchResult],
    name: &dyn Fn(&RepositoryId) -> String,
) -> Message {
    let succeeded = results.iter().filter(|r| r.succeeded()).count();
    let title = format!(
        "[QAS] Pipelines: {succeeded}/{} succeeded",
        results.len()
    );

    let lines = results
        .iter()
        .map(|result| {
            let mut line = format!(
                "{} **{}**: {}",
                result_emoji(result),
                name(&result.repository_id),
                outcome_text(result)
            );
            if let Some(ref run) = result.run {
                let number = run
                    .build_number
                    .clone()
                    .unwrap_or_else(|| run.run_id.to_string());
                line.push_str(&format!(
                    ", build {number} (id={}), {}",
                    run.run_id,
                    duration_text(result)
                ));
                if let Some(ref url) = run.url {
                    line.push_str(&format!(" [open]({url})"));
                }
            }
            line
        })
        .collect();

    Message {
        title,
        lines,
        color: summary_color(results).to_string(),
    }
}
