//! Core types for qas-gate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Prefix Azure DevOps puts in front of branch names
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Strip `refs/heads/` from a branch reference, if present
pub fn short_branch_name(name: &str) -> &str {
    name.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(name)
}

/// Opaque repository identifier (an Azure DevOps repository GUID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepositoryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RepositoryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A reviewer's vote on a pull request
///
/// Azure DevOps encodes votes as integers: 10 approved, 5 approved with
/// suggestions, 0 no vote, -5 waiting for author, -10 rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReviewerVote {
    /// Approved (10)
    Approved,
    /// Approved with suggestions (5)
    ApprovedWithSuggestions,
    /// No vote cast (0)
    #[default]
    NoVote,
    /// Waiting for author (-5)
    WaitingForAuthor,
    /// Rejected (-10)
    Rejected,
}

impl ReviewerVote {
    /// Decode the platform's integer vote
    pub const fn from_score(score: i32) -> Self {
        match score {
            10.. => Self::Approved,
            1..=9 => Self::ApprovedWithSuggestions,
            0 => Self::NoVote,
            -9..=-1 => Self::WaitingForAuthor,
            _ => Self::Rejected,
        }
    }

    /// The platform's integer encoding
    pub const fn score(self) -> i32 {
        match self {
            Self::Approved => 10,
            Self::ApprovedWithSuggestions => 5,
            Self::NoVote => 0,
            Self::WaitingForAuthor => -5,
            Self::Rejected => -10,
        }
    }

    /// Whether this vote already counts as an approval
    pub const fn is_approval(self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedWithSuggestions)
    }
}

/// Merge status reported by the platform for a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStatus {
    /// Status not computed yet
    #[default]
    NotSet,
    /// Merge is queued
    Queued,
    /// Merge has conflicts
    Conflicts,
    /// Merge succeeded
    Succeeded,
    /// Merge rejected by a branch policy
    RejectedByPolicy,
    /// Merge failed
    Failure,
    /// Anything newer than this client understands
    #[serde(other)]
    Unknown,
}

/// A pull request, read fresh on every operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number
    pub id: u64,
    /// Repository the PR belongs to
    pub repository_id: RepositoryId,
    /// PR title
    pub title: String,
    /// Source branch (as reported, usually `refs/heads/...`)
    pub source_branch: String,
    /// Target branch (as reported, usually `refs/heads/...`)
    pub target_branch: String,
    /// Current vote per reviewer id
    pub reviewer_votes: HashMap<String, ReviewerVote>,
    /// Platform merge status
    pub merge_status: MergeStatus,
    /// Head commit the platform last evaluated for merging
    pub last_merge_source_commit: Option<String>,
    /// Web URL, when known
    pub url: Option<String>,
}

impl PullRequest {
    /// Whether the PR targets `branch` (case-insensitive, `refs/heads/` optional)
    pub fn targets(&self, branch: &str) -> bool {
        short_branch_name(&self.target_branch).eq_ignore_ascii_case(short_branch_name(branch))
    }

    /// Current vote of a reviewer (reviewer ids compare case-insensitively)
    pub fn vote_of(&self, reviewer_id: &str) -> ReviewerVote {
        self.reviewer_votes
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(reviewer_id))
            .map(|(_, vote)| *vote)
            .unwrap_or_default()
    }
}

/// Failure and outcome taxonomy recorded on result items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The approval vote could not be submitted
    ApprovalFailed,
    /// The PR was approved but could not be completed
    MergeFailed,
    /// A pipeline status read failed (retried on the next tick)
    FetchFailed,
    /// The watch deadline elapsed before the run resolved
    TimedOut,
    /// The chat notification could not be delivered
    NotificationFailed,
    /// Listing the repository's pull requests failed
    ListFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ApprovalFailed => "approval failed",
            Self::MergeFailed => "merge failed",
            Self::FetchFailed => "fetch failed",
            Self::TimedOut => "timed out",
            Self::NotificationFailed => "notification failed",
            Self::ListFailed => "listing failed",
        };
        f.write_str(s)
    }
}

/// Result of approving and merging one eligible PR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    /// PR number
    pub pull_request_id: u64,
    /// Repository the PR belongs to
    pub repository_id: RepositoryId,
    /// Whether the approval vote was recorded
    pub approved: bool,
    /// Whether the merge request was accepted
    pub merged: bool,
    /// Failure classification, if any step failed
    pub error_kind: Option<ErrorKind>,
    /// Failure detail, if any step failed
    pub error_message: Option<String>,
}

impl ApprovalOutcome {
    /// Whether both steps succeeded
    pub const fn is_success(&self) -> bool {
        self.approved && self.merged
    }
}

/// State of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Waiting for an agent
    Queued,
    /// Executing
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with failures
    Failed,
    /// Cancelled before finishing
    Canceled,
}

impl RunState {
    /// Whether the run has reached a final state
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// A pipeline (build) run for a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Repository the run was triggered for
    pub repository_id: RepositoryId,
    /// Build id
    pub run_id: u64,
    /// Human-facing build number
    pub build_number: Option<String>,
    /// Current state
    pub state: RunState,
    /// Succeeded with warnings or failed non-critical steps
    pub partially_succeeded: bool,
    /// When the run started executing
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Web URL of the run
    pub url: Option<String>,
}

impl PipelineRun {
    /// Wall-clock duration, when both timestamps are known
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }
}

/// Where a repository ended up in a watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchStatus {
    /// The run reached a final state
    Resolved,
    /// Single-pass snapshot of a run that had not finished
    Pending,
    /// The deadline (or cancellation) came first
    TimedOut,
}

/// Outcome of watching one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResult {
    /// Watched repository
    pub repository_id: RepositoryId,
    /// Terminal status within the session
    pub status: WatchStatus,
    /// Last observed run state (`None` if no run was ever observed)
    pub final_state: Option<RunState>,
    /// Whether a final run state was reached before the deadline
    pub resolved_within_deadline: bool,
    /// Time from session start until this result was produced
    pub elapsed: Duration,
    /// Last observed run
    pub run: Option<PipelineRun>,
    /// Number of polls made for this repository
    pub attempts: u32,
    /// Most recent fetch error, kept for diagnostics
    pub last_error: Option<String>,
}

impl WatchResult {
    /// Classification for reporting: `TimedOut` for timed-out repositories
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self.status {
            WatchStatus::TimedOut => Some(ErrorKind::TimedOut),
            WatchStatus::Resolved | WatchStatus::Pending => None,
        }
    }

    /// Whether the repository's run finished successfully
    pub fn succeeded(&self) -> bool {
        self.final_state == Some(RunState::Succeeded)
    }
}
