//! Orchestrator facade
//!
//! Composes eligibility, approval/merge, the watch loop, and notification
//! into the operations exposed to the CLI. Configuration is injected once and
//! never mutated.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gate::{
    ApproveMergeOptions, approve_and_merge, is_allowed, is_eligible, select_eligible,
};
use crate::notify::{Notifier, notify, summary_message};
use crate::platform::RepositoryClient;
use crate::types::{ApprovalOutcome, ErrorKind, PullRequest, RepositoryId, WatchResult};
use crate::watch::{NoProgress, WatchOptions, WatchProgress, watch};
use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::hash::BuildHasher;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a promotion-branch PR was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The configured reviewer has already approved it
    AlreadyApproved,
}

/// A promotion-branch PR that was not processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPullRequest {
    /// Repository the PR belongs to
    pub repository_id: RepositoryId,
    /// PR number
    pub pull_request_id: u64,
    /// Why it was skipped
    pub reason: SkipReason,
}

/// A repository that could not be processed at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryFailure {
    /// Repository
    pub repository_id: RepositoryId,
    /// Failure classification
    pub error_kind: ErrorKind,
    /// Failure detail
    pub message: String,
}

/// Result of an approve-and-merge invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// One outcome per eligible PR, ordered by repository then listing order
    pub outcomes: Vec<ApprovalOutcome>,
    /// Promotion-branch PRs skipped because they were already approved
    pub skipped: Vec<SkippedPullRequest>,
    /// Requested PR ids not found on the promotion branch of any repository
    pub missing_pull_request_ids: Vec<u64>,
    /// Repositories whose PRs could not be listed
    pub failed_repositories: Vec<RepositoryFailure>,
}

impl MergeReport {
    /// Whether every requested item went through cleanly
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(ApprovalOutcome::is_success)
            && self.missing_pull_request_ids.is_empty()
            && self.failed_repositories.is_empty()
    }
}

/// A promotion-branch PR with its eligibility
#[derive(Debug, Clone)]
pub struct PromotionPr {
    /// The PR as listed
    pub pull_request: PullRequest,
    /// Whether approve-and-merge would process it
    pub eligible: bool,
}

/// Promotion-branch PRs of one repository
#[derive(Debug, Clone)]
pub struct RepositoryListing {
    /// Repository
    pub repository_id: RepositoryId,
    /// PRs, or the listing error
    pub pull_requests: std::result::Result<Vec<PromotionPr>, String>,
}

/// Facade over the PR gate and the pipeline watch
pub struct Orchestrator {
    config: Arc<Config>,
    client: Arc<dyn RepositoryClient>,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    /// Create a facade from its collaborators
    pub fn new(
        config: Arc<Config>,
        client: Arc<dyn RepositoryClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            client,
            notifier,
        }
    }

    /// The configuration this facade was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Requested repositories, or the default set when none are given
    pub fn resolve_repositories(
        &self,
        repository_ids: Option<&[RepositoryId]>,
    ) -> Vec<RepositoryId> {
        match repository_ids {
            Some(ids) if !ids.is_empty() => ids.to_vec(),
            _ => self.config.default_repository_ids(),
        }
    }

    fn reviewer_id(&self) -> Result<&str> {
        self.config
            .reviewer_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::Config("reviewer id is not configured".to_string()))
    }

    async fn list_all(
        &self,
        repositories: &[RepositoryId],
    ) -> Vec<Result<Vec<PullRequest>>> {
        join_all(
            repositories
                .iter()
                .map(|id| self.client.list_pull_requests(id)),
        )
        .await
    }

    /// Approve and merge every eligible PR across repositories
    ///
    /// PRs are listed fresh, filtered, then approved and completed with
    /// per-PR isolation. A missing reviewer id is the only hard failure; a
    /// repository whose listing fails is reported in the
    /// [`MergeReport`] and the others proceed.
    pub async fn approve_and_merge_eligible<S: BuildHasher>(
        &self,
        repository_ids: Option<&[RepositoryId]>,
        pull_request_ids: Option<&HashSet<u64, S>>,
    ) -> Result<MergeReport> {
        let reviewer_id = self.reviewer_id()?;
        let branch = &self.config.promotion_branch;
        let repositories = self.resolve_repositories(repository_ids);
        info!(
            repositories = repositories.len(),
            allow_list = pull_request_ids.map(HashSet::len),
            "approve-and-merge started"
        );

        let mut report = MergeReport::default();
        let mut eligible = Vec::new();
        let mut found = HashSet::new();

        let listings = self.list_all(&repositories).await;
        for (repository_id, listing) in repositories.iter().zip(listings) {
            let prs = match listing {
                Ok(prs) => prs,
                Err(e) => {
                    warn!(%repository_id, error = %e, "failed to list PRs");
                    report.failed_repositories.push(RepositoryFailure {
                        repository_id: repository_id.clone(),
                        error_kind: ErrorKind::ListFailed,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let targeted: Vec<PullRequest> =
                prs.into_iter().filter(|pr| pr.targets(branch)).collect();
            found.extend(targeted.iter().map(|pr| pr.id));
            for pr in &targeted {
                if is_allowed(pr.id, pull_request_ids) && pr.vote_of(reviewer_id).is_approval() {
                    info!(%repository_id, pr_id = pr.id, "already approved, skipping");
                    report.skipped.push(SkippedPullRequest {
                        repository_id: repository_id.clone(),
                        pull_request_id: pr.id,
                        reason: SkipReason::AlreadyApproved,
                    });
                }
            }
            eligible.extend(select_eligible(&targeted, branch, reviewer_id, pull_request_ids));
        }

        if let Some(ids) = pull_request_ids {
            report.missing_pull_request_ids = ids
                .iter()
                .filter(|id| !found.contains(*id))
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
        }

        let options = ApproveMergeOptions {
            max_concurrency: self.config.max_concurrency,
        };
        report.outcomes =
            approve_and_merge(self.client.as_ref(), &eligible, reviewer_id, options).await;

        info!(
            processed = report.outcomes.len(),
            merged = report.outcomes.iter().filter(|o| o.merged).count(),
            skipped = report.skipped.len(),
            "approve-and-merge finished"
        );
        Ok(report)
    }

    /// Promotion-branch PRs per repository, with eligibility (read-only)
    pub async fn list_promotion_prs(
        &self,
        repository_ids: Option<&[RepositoryId]>,
    ) -> Vec<RepositoryListing> {
        let branch = &self.config.promotion_branch;
        let reviewer_id = self.config.reviewer_id.as_deref().unwrap_or_default();
        let repositories = self.resolve_repositories(repository_ids);
        let listings = self.list_all(&repositories).await;

        repositories
            .into_iter()
            .zip(listings)
            .map(|(repository_id, listing)| RepositoryListing {
                repository_id,
                pull_requests: listing
                    .map(|prs| {
                        prs.into_iter()
                            .filter(|pr| pr.targets(branch))
                            .map(|pr| PromotionPr {
                                eligible: is_eligible::<std::hash::RandomState>(
                                    &pr,
                                    branch,
                                    reviewer_id,
                                    None,
                                ),
                                pull_request: pr,
                            })
                            .collect()
                    })
                    .map_err(|e| e.to_string()),
            })
            .collect()
    }

    /// Watch pipelines, then send one summary notification
    ///
    /// The results are returned whether or not the notification was delivered.
    pub async fn watch_and_notify(
        &self,
        repository_ids: Option<&[RepositoryId]>,
        options: &WatchOptions,
        cancel: &CancellationToken,
        progress: &dyn WatchProgress,
    ) -> Result<Vec<WatchResult>> {
        let repositories = self.resolve_repositories(repository_ids);
        let results = watch(self.client.as_ref(), &repositories, options, cancel, progress).await?;

        let message = summary_message(&results, &|id| self.config.alias_for(id).to_string());
        notify(self.notifier.as_ref(), &message).await;

        Ok(results)
    }

    /// Single status snapshot of each repository's latest run, no notification
    pub async fn pipeline_status(
        &self,
        repository_ids: Option<&[RepositoryId]>,
    ) -> Result<Vec<WatchResult>> {
        let repositories = self.resolve_repositories(repository_ids);
        let options = WatchOptions {
            once: true,
            ..WatchOptions::default()
        };
        watch(
            self.client.as_ref(),
            &repositories,
            &options,
            &CancellationToken::new(),
            &NoProgress,
        )
        .await
    }
}
