//! Eligibility filter - pure selection of PRs to approve and merge
//!
//! No I/O happens here. The listing is read fresh by the caller on every
//! invocation, so votes cast by other reviewers between runs are honoured.

use crate::types::PullRequest;
use std::collections::HashSet;
use std::hash::BuildHasher;

/// Whether `pr_id` passes the allow-list; absent or empty allows every PR
pub fn is_allowed<S: BuildHasher>(pr_id: u64, allowed_pr_ids: Option<&HashSet<u64, S>>) -> bool {
    allowed_pr_ids.is_none_or(|ids| ids.is_empty() || ids.contains(&pr_id))
}

/// Whether a single PR should be approved and merged
///
/// A PR is eligible when it targets `promotion_branch` (case-insensitive),
/// is in `allowed_pr_ids` when an allow-list is given, and `reviewer_id` has
/// not already approved it. An empty allow-list means "all PRs".
pub fn is_eligible<S: BuildHasher>(
    pr: &PullRequest,
    promotion_branch: &str,
    reviewer_id: &str,
    allowed_pr_ids: Option<&HashSet<u64, S>>,
) -> bool {
    pr.targets(promotion_branch)
        && is_allowed(pr.id, allowed_pr_ids)
        && !pr.vote_of(reviewer_id).is_approval()
}

/// Select eligible PRs, preserving input order
#[must_use]
pub fn select_eligible<S: BuildHasher>(
    prs: &[PullRequest],
    promotion_branch: &str,
    reviewer_id: &str,
    allowed_pr_ids: Option<&HashSet<u64, S>>,
) -> Vec<PullRequest> {
    prs.iter()
        .filter(|pr| is_eligible(pr, promotion_branch, reviewer_id, allowed_pr_ids))
        .cloned()
        .collect()
}
