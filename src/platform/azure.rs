//! Azure DevOps repository client

use crate::config::Config;
use crate::error::{Error, Result};
use crate::platform::RepositoryClient;
use crate::platform::retry::{RetryConfig, retry_with_backoff};
use crate::types::{
    BRANCH_REF_PREFIX, MergeStatus, PipelineRun, PullRequest, RepositoryId, ReviewerVote, RunState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Default API host
const DEFAULT_BASE_URL: &str = "https://dev.azure.com";

/// Page size for PR listing
const PAGE_SIZE: usize = 200;

/// Longest response body kept in an error message
const MAX_ERROR_BODY: usize = 500;

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdoPullRequest {
    pull_request_id: u64,
    #[serde(default)]
    title: String,
    source_ref_name: String,
    target_ref_name: String,
    #[serde(default)]
    reviewers: Vec<AdoReviewer>,
    #[serde(default)]
    merge_status: MergeStatus,
    last_merge_source_commit: Option<AdoCommitRef>,
    repository: Option<AdoRepository>,
}

#[derive(Deserialize)]
struct AdoReviewer {
    id: String,
    #[serde(default)]
    vote: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdoCommitRef {
    commit_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdoRepository {
    web_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdoBuild {
    id: u64,
    build_number: Option<String>,
    status: Option<String>,
    result: Option<String>,
    start_time: Option<DateTime<Utc>>,
    finish_time: Option<DateTime<Utc>>,
    #[serde(rename = "_links")]
    links: Option<AdoLinks>,
}

#[derive(Deserialize)]
struct AdoLinks {
    web: Option<AdoHref>,
}

#[derive(Deserialize)]
struct AdoHref {
    href: String,
}

impl AdoPullRequest {
    fn into_pull_request(self, repository_id: &RepositoryId) -> PullRequest {
        let url = self
            .repository
            .and_then(|r| r.web_url)
            .map(|web| format!("{web}/pullrequest/{}", self.pull_request_id));
        PullRequest {
            id: self.pull_request_id,
            repository_id: repository_id.clone(),
            title: self.title,
            source_branch: self.source_ref_name,
            target_branch: self.target_ref_name,
            reviewer_votes: self
                .reviewers
                .into_iter()
                .map(|r| (r.id, ReviewerVote::from_score(r.vote)))
                .collect(),
            merge_status: self.merge_status,
            last_merge_source_commit: self.last_merge_source_commit.map(|c| c.commit_id),
            url,
        }
    }
}

impl AdoBuild {
    fn into_pipeline_run(self, repository_id: &RepositoryId) -> PipelineRun {
        let result = self.result.as_deref();
        PipelineRun {
            repository_id: repository_id.clone(),
            run_id: self.id,
            build_number: self.build_number,
            state: run_state(self.status.as_deref(), result),
            partially_succeeded: result
                .is_some_and(|r| r.eq_ignore_ascii_case("partiallySucceeded")),
            started_at: self.start_time,
            finished_at: self.finish_time,
            url: self.links.and_then(|l| l.web).map(|w| w.href),
        }
    }
}

/// Map an Azure DevOps build `status`/`result` pair to a [`RunState`]
///
/// A completed build with a missing or unrecognised result counts as failed,
/// so the watch never waits on a build that will not change again.
pub(crate) fn run_state(status: Option<&str>, result: Option<&str>) -> RunState {
    let status = status.unwrap_or_default().to_ascii_lowercase();
    match status.as_str() {
        "completed" => match result.map(str::to_ascii_lowercase).as_deref() {
            Some("succeeded" | "partiallysucceeded") => RunState::Succeeded,
            Some("canceled") => RunState::Canceled,
            _ => RunState::Failed,
        },
        "inprogress" | "cancelling" => RunState::Running,
        _ => RunState::Queued,
    }
}

/// Repository client for Azure DevOps Services (REST API 7.x)
///
/// All operations share one HTTP connection pool and one request limiter, so
/// concurrent approvals and polls never exceed `max_in_flight_requests`.
pub struct AzureDevOpsClient {
    client: Client,
    pat: String,
    base_url: String,
    config: Arc<Config>,
    limiter: Arc<Semaphore>,
    retry: RetryConfig,
}

impl AzureDevOpsClient {
    /// Create a client authenticating with a personal access token
    pub fn new(pat: &str, config: Arc<Config>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("qasgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            pat: pat.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            limiter: Arc::new(Semaphore::new(config.max_in_flight_requests)),
            config,
            retry: RetryConfig::DEFAULT,
        })
    }

    /// Point the client at another host (Azure DevOps Server, tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the retry policy for reads
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn org_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url,
            urlencoding::encode(&self.config.organization)
        )
    }

    fn project_url(&self, project: &str) -> String {
        format!("{}/{}", self.org_url(), urlencoding::encode(project))
    }

    fn git_url(&self, repository_id: &RepositoryId, path: &str) -> String {
        format!(
            "{}/_apis/git/repositories/{}{path}",
            self.project_url(self.config.project_for(repository_id)),
            urlencoding::encode(repository_id.as_str())
        )
    }

    fn builds_url(&self, repository_id: &RepositoryId) -> String {
        format!(
            "{}/_apis/build/builds",
            self.project_url(self.config.project_for(repository_id))
        )
    }

    fn branch_ref(&self) -> String {
        let branch = &self.config.promotion_branch;
        if branch.starts_with(BRANCH_REF_PREFIX) {
            branch.clone()
        } else {
            format!("{BRANCH_REF_PREFIX}{branch}")
        }
    }

    /// Send a request under the shared limiter and reject non-2xx answers
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| Error::Internal("request limiter closed".to_string()))?;

        let response = request
            .basic_auth("", Some(&self.pat))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body.chars().take(MAX_ERROR_BODY).collect()
        };
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// GET and decode JSON, retrying transient failures
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        retry_with_backoff(self.retry, move || async move {
            let response = self.send(self.client.get(url).query(query)).await?;
            Ok(response.json::<T>().await?)
        })
        .await
    }

    /// Check that the token is valid and can read builds
    ///
    /// Maps 401 answers to [`Error::Auth`] with a hint about the missing scope.
    pub async fn verify_access(&self) -> Result<()> {
        let url = format!("{}/_apis/connectionData", self.org_url());
        let query = [("api-version", self.config.api_version.clone())];
        match self.send(self.client.get(&url).query(&query)).await {
            Err(Error::Api { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                return Err(Error::Auth(
                    "token rejected (401); check that the PAT is valid and not expired".to_string(),
                ));
            }
            Err(e) => return Err(e),
            Ok(_) => {}
        }

        let url = format!("{}/_apis/build/builds", self.project_url(&self.config.project));
        let query = [
            ("$top", "1".to_string()),
            ("api-version", self.config.api_version.clone()),
        ];
        match self.send(self.client.get(&url).query(&query)).await {
            Err(Error::Api { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                Err(Error::Auth(
                    "builds not readable (401); the PAT needs the 'Build: Read' scope".to_string(),
                ))
            }
            Err(e) => Err(e),
            Ok(_) => {
                debug!("access verified");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RepositoryClient for AzureDevOpsClient {
    async fn list_pull_requests(&self, repository_id: &RepositoryId) -> Result<Vec<PullRequest>> {
        debug!(%repository_id, "listing active PRs");
        let url = self.git_url(repository_id, "/pullrequests");
        let mut prs = Vec::new();
        let mut skip = 0;

        loop {
            let query = [
                ("searchCriteria.status", "active".to_string()),
                ("api-version", self.config.api_version.clone()),
                ("$top", PAGE_SIZE.to_string()),
                ("$skip", skip.to_string()),
            ];
            let page: ListResponse<AdoPullRequest> = self.get_json(&url, &query).await?;
            let count = page.value.len();
            prs.extend(
                page.value
                    .into_iter()
                    .map(|pr| pr.into_pull_request(repository_id)),
            );
            if count < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        debug!(%repository_id, count = prs.len(), "listed active PRs");
        Ok(prs)
    }

    async fn approve(
        &self,
        repository_id: &RepositoryId,
        pr_id: u64,
        reviewer_id: &str,
    ) -> Result<()> {
        debug!(%repository_id, pr_id, "approving PR");
        let url = self.git_url(
            repository_id,
            &format!(
                "/pullRequests/{pr_id}/reviewers/{}",
                urlencoding::encode(reviewer_id)
            ),
        );
        let body = serde_json::json!({
            "id": reviewer_id,
            "vote": ReviewerVote::Approved.score(),
        });
        self.send(
            self.client
                .put(&url)
                .query(&[("api-version", &self.config.api_version)])
                .json(&body),
        )
        .await?;
        debug!(%repository_id, pr_id, "approved PR");
        Ok(())
    }

    async fn merge(
        &self,
        repository_id: &RepositoryId,
        pr_id: u64,
        source_commit: Option<&str>,
    ) -> Result<()> {
        let options = &self.config.merge;
        debug!(
            %repository_id,
            pr_id,
            strategy = options.strategy.as_api_str(),
            source_commit,
            "completing PR"
        );
        let url = self.git_url(repository_id, &format!("/pullRequests/{pr_id}"));
        let mut body = serde_json::json!({
            "status": "completed",
            "completionOptions": {
                "mergeStrategy": options.strategy.as_api_str(),
                "deleteSourceBranch": options.delete_source_branch,
                "bypassPolicy": options.bypass_policy,
            }
        });
        if let Some(commit) = source_commit {
            body["lastMergeSourceCommit"] = serde_json::json!({ "commitId": commit });
        }
        self.send(
            self.client
                .patch(&url)
                .query(&[("api-version", &self.config.api_version)])
                .json(&body),
        )
        .await?;
        debug!(%repository_id, pr_id, "completion accepted");
        Ok(())
    }

    async fn latest_pipeline_run(
        &self,
        repository_id: &RepositoryId,
    ) -> Result<Option<PipelineRun>> {
        debug!(%repository_id, "fetching latest pipeline run");
        let url = self.builds_url(repository_id);
        let mut query = vec![
            ("repositoryId", repository_id.to_string()),
            ("repositoryType", "TfsGit".to_string()),
            ("branchName", self.branch_ref()),
            ("queryOrder", "queueTimeDescending".to_string()),
            ("$top", "1".to_string()),
            ("api-version", self.config.api_version.clone()),
        ];
        if let Some(definition) = self.config.definition_for(repository_id) {
            query.push(("definitions", definition.to_string()));
        }

        let page: ListResponse<AdoBuild> = self.get_json(&url, &query).await?;
        let run = page
            .value
            .into_iter()
            .next()
            .map(|b| b.into_pipeline_run(repository_id));
        debug!(
            %repository_id,
            run_id = run.as_ref().map(|r| r.run_id),
            state = ?run.as_ref().map(|r| r.state),
            "fetched latest pipeline run"
        );
        Ok(run)
    }

    async fn pipeline_run(&self, repository_id: &RepositoryId, run_id: u64) -> Result<PipelineRun> {
        debug!(%repository_id, run_id, "fetching pipeline run");
        let url = format!("{}/{run_id}", self.builds_url(repository_id));
        let query = [("api-version", self.config.api_version.clone())];
        let build: AdoBuild = self.get_json(&url, &query).await?;
        Ok(build.into_pipeline_run(repository_id))
    }
}
