//! Approval/merge execution - effectful operations
//!
//! Takes the eligible PRs selected by the pure filter and drives each one
//! through approve-then-complete via the repository client. Each PR is an
//! independent unit: a failure is recorded on that PR's outcome and the
//! remaining PRs carry on.

use crate::platform::RepositoryClient;
use crate::types::{ApprovalOutcome, ErrorKind, PullRequest};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

/// Options for approval/merge execution
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveMergeOptions {
    /// Maximum PRs processed at once (`None` = all at once)
    pub max_concurrency: Option<usize>,
}

/// Approve and complete every eligible PR (EFFECTFUL)
///
/// Makes one approve call and at most one merge call per PR, with no retries
/// at this layer. PRs run concurrently up to `max_concurrency`; the returned
/// outcomes are in input order regardless of completion order, one per PR.
pub async fn approve_and_merge(
    client: &dyn RepositoryClient,
    eligible: &[PullRequest],
    reviewer_id: &str,
    options: ApproveMergeOptions,
) -> Vec<ApprovalOutcome> {
    let limit = options.max_concurrency.unwrap_or(eligible.len()).max(1);

    stream::iter(eligible)
        .map(|pr| approve_then_merge(client, pr, reviewer_id))
        .buffered(limit)
        .collect()
        .await
}

async fn approve_then_merge(
    client: &dyn RepositoryClient,
    pr: &PullRequest,
    reviewer_id: &str,
) -> ApprovalOutcome {
    let repository_id = &pr.repository_id;
    let mut outcome = ApprovalOutcome {
        pull_request_id: pr.id,
        repository_id: repository_id.clone(),
        approved: false,
        merged: false,
        error_kind: None,
        error_message: None,
    };

    if let Err(e) = client.approve(repository_id, pr.id, reviewer_id).await {
        warn!(%repository_id, pr_id = pr.id, error = %e, "approval failed");
        outcome.error_kind = Some(ErrorKind::ApprovalFailed);
        outcome.error_message = Some(e.to_string());
        return outcome;
    }
    outcome.approved = true;

    // A PR completed by someone else in the meantime fails here, which is
    // reported as MergeFailed like any other rejection.
    match client
        .merge(repository_id, pr.id, pr.last_merge_source_commit.as_deref())
        .await
    {
        Ok(()) => {
            info!(%repository_id, pr_id = pr.id, "PR approved and merged");
            outcome.merged = true;
        }
        Err(e) => {
            warn!(%repository_id, pr_id = pr.id, error = %e, "merge failed");
            outcome.error_kind = Some(ErrorKind::MergeFailed);
            outcome.error_message = Some(e.to_string());
        }
    }

    outcome
}
