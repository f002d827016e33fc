//! Remote repository services
//!
//! Provides the capability the orchestrator consumes: listing PRs, approving,
//! completing, and reading pipeline runs for a repository.

mod azure;
mod retry;

pub use azure::AzureDevOpsClient;
pub use retry::RetryConfig;

use crate::error::Result;
use crate::types::{PipelineRun, PullRequest, RepositoryId};
use async_trait::async_trait;

/// Remote repository service trait
///
/// Implementations own their transport (connection pool, rate limiting,
/// retries for reads). Callers share one instance across all concurrent
/// operations.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// List open pull requests for a repository
    async fn list_pull_requests(&self, repository_id: &RepositoryId) -> Result<Vec<PullRequest>>;

    /// Record an approval vote from `reviewer_id`
    async fn approve(&self, repository_id: &RepositoryId, pr_id: u64, reviewer_id: &str)
    -> Result<()>;

    /// Complete (merge) a pull request
    ///
    /// `source_commit` is the head commit the caller observed; when given, the
    /// platform refuses to complete a PR whose head has since moved. The merge
    /// strategy is whatever the implementation is configured with.
    async fn merge(
        &self,
        repository_id: &RepositoryId,
        pr_id: u64,
        source_commit: Option<&str>,
    ) -> Result<()>;

    /// Most recent pipeline run for the promotion branch, if any exists
    async fn latest_pipeline_run(&self, repository_id: &RepositoryId)
    -> Result<Option<PipelineRun>>;

    /// A specific pipeline run
    async fn pipeline_run(&self, repository_id: &RepositoryId, run_id: u64) -> Result<PipelineRun>;
}
