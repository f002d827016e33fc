//! Mock repository client for testing
//!
//! These are test utilities - not all may be used by every test binary.

#![allow(dead_code)]

use async_trait::async_trait;
use qas_gate::error::{Error, Result};
use qas_gate::platform::RepositoryClient;
use qas_gate::types::{PipelineRun, PullRequest, RepositoryId, ReviewerVote};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Call record for `approve`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproveCall {
    pub repository_id: RepositoryId,
    pub pr_id: u64,
    pub reviewer_id: String,
}

/// Call record for `merge`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCall {
    pub repository_id: RepositoryId,
    pub pr_id: u64,
    pub source_commit: Option<String>,
}

/// Scripted answer to a pipeline poll
#[derive(Debug, Clone)]
pub enum PollAnswer {
    Run(PipelineRun),
    NoRun,
    Fail(String),
}

/// In-memory repository client
///
/// Behaves like a small Azure DevOps: approving records the reviewer's vote,
/// merging removes the PR from the active list.
///
/// Features:
/// - Call tracking for verification
/// - Error injection per repository / PR
/// - Scripted pipeline poll sequences (the last answer repeats)
/// - Per-PR approval delays and an in-flight high-water mark
/// - Per-repository poll delays
pub struct MockRepositoryClient {
    pull_requests: Mutex<HashMap<RepositoryId, Vec<PullRequest>>>,
    polls: Mutex<HashMap<RepositoryId, VecDeque<PollAnswer>>>,
    pinned_runs: Mutex<HashMap<(RepositoryId, u64), PipelineRun>>,
    // Call tracking
    list_calls: Mutex<Vec<RepositoryId>>,
    approve_calls: Mutex<Vec<ApproveCall>>,
    merge_calls: Mutex<Vec<MergeCall>>,
    poll_calls: Mutex<Vec<RepositoryId>>,
    // Error injection
    fail_list: Mutex<HashSet<RepositoryId>>,
    fail_approve: Mutex<HashSet<u64>>,
    fail_merge: Mutex<HashSet<u64>>,
    // Timing
    approve_delays: Mutex<HashMap<u64, Duration>>,
    poll_delays: Mutex<HashMap<RepositoryId, Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRepositoryClient {
    pub fn new() -> Self {
        Self {
            pull_requests: Mutex::new(HashMap::new()),
            polls: Mutex::new(HashMap::new()),
            pinned_runs: Mutex::new(HashMap::new()),
            list_calls: Mutex::new(Vec::new()),
            approve_calls: Mutex::new(Vec::new()),
            merge_calls: Mutex::new(Vec::new()),
            poll_calls: Mutex::new(Vec::new()),
            fail_list: Mutex::new(HashSet::new()),
            fail_approve: Mutex::new(HashSet::new()),
            fail_merge: Mutex::new(HashSet::new()),
            approve_delays: Mutex::new(HashMap::new()),
            poll_delays: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    // === Setup ===

    /// Add an active PR
    pub fn add_pr(&self, pr: PullRequest) {
        self.pull_requests
            .lock()
            .unwrap()
            .entry(pr.repository_id.clone())
            .or_default()
            .push(pr);
    }

    /// Script the answers to `latest_pipeline_run` for a repository
    pub fn script_polls(&self, repo: &str, answers: Vec<PollAnswer>) {
        self.polls
            .lock()
            .unwrap()
            .insert(RepositoryId::from(repo), answers.into());
    }

    /// Make `pipeline_run(repo, run.run_id)` return `run`
    pub fn set_pinned_run(&self, run: PipelineRun) {
        self.pinned_runs
            .lock()
            .unwrap()
            .insert((run.repository_id.clone(), run.run_id), run);
    }

    /// Delay the approval of a PR
    pub fn delay_approve(&self, pr_id: u64, delay: Duration) {
        self.approve_delays.lock().unwrap().insert(pr_id, delay);
    }

    /// Delay every pipeline poll of a repository
    pub fn delay_polls(&self, repo: &str, delay: Duration) {
        self.poll_delays
            .lock()
            .unwrap()
            .insert(RepositoryId::from(repo), delay);
    }

    // === Error injection ===

    /// Make `list_pull_requests` fail for a repository
    pub fn fail_list(&self, repo: &str) {
        self.fail_list.lock().unwrap().insert(RepositoryId::from(repo));
    }

    /// Make `approve` fail for a PR
    pub fn fail_approve(&self, pr_id: u64) {
        self.fail_approve.lock().unwrap().insert(pr_id);
    }

    /// Make `merge` fail for a PR
    pub fn fail_merge(&self, pr_id: u64) {
        self.fail_merge.lock().unwrap().insert(pr_id);
    }

    // === Inspection ===

    pub fn list_calls(&self) -> Vec<RepositoryId> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn approve_calls(&self) -> Vec<ApproveCall> {
        self.approve_calls.lock().unwrap().clone()
    }

    pub fn merge_calls(&self) -> Vec<MergeCall> {
        self.merge_calls.lock().unwrap().clone()
    }

    pub fn poll_calls(&self) -> Vec<RepositoryId> {
        self.poll_calls.lock().unwrap().clone()
    }

    /// Number of polls made for one repository
    pub fn poll_count(&self, repo: &str) -> usize {
        self.poll_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == repo)
            .count()
    }

    /// Highest number of approvals that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Active PR ids of a repository
    pub fn active_pr_ids(&self, repo: &str) -> Vec<u64> {
        self.pull_requests
            .lock()
            .unwrap()
            .get(&RepositoryId::from(repo))
            .map(|prs| prs.iter().map(|pr| pr.id).collect())
            .unwrap_or_default()
    }
}

impl Default for MockRepositoryClient {
    fn default() -> Self {
        Self::new()
    }
}

fn server_error(message: &str) -> Error {
    Error::Api {
        status: 500,
        message: message.to_string(),
    }
}

#[async_trait]
impl RepositoryClient for MockRepositoryClient {
    async fn list_pull_requests(&self, repository_id: &RepositoryId) -> Result<Vec<PullRequest>> {
        self.list_calls.lock().unwrap().push(repository_id.clone());
        if self.fail_list.lock().unwrap().contains(repository_id) {
            return Err(server_error("listing unavailable"));
        }
        Ok(self
            .pull_requests
            .lock()
            .unwrap()
            .get(repository_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn approve(
        &self,
        repository_id: &RepositoryId,
        pr_id: u64,
        reviewer_id: &str,
    ) -> Result<()> {
        self.approve_calls.lock().unwrap().push(ApproveCall {
            repository_id: repository_id.clone(),
            pr_id,
            reviewer_id: reviewer_id.to_string(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self.approve_delays.lock().unwrap().get(&pr_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_approve.lock().unwrap().contains(&pr_id) {
            return Err(server_error("vote rejected"));
        }
        let mut prs = self.pull_requests.lock().unwrap();
        if let Some(pr) = prs
            .get_mut(repository_id)
            .and_then(|prs| prs.iter_mut().find(|pr| pr.id == pr_id))
        {
            pr.reviewer_votes
                .insert(reviewer_id.to_string(), ReviewerVote::Approved);
        }
        Ok(())
    }

    async fn merge(
        &self,
        repository_id: &RepositoryId,
        pr_id: u64,
        source_commit: Option<&str>,
    ) -> Result<()> {
        self.merge_calls.lock().unwrap().push(MergeCall {
            repository_id: repository_id.clone(),
            pr_id,
            source_commit: source_commit.map(String::from),
        });
        if self.fail_merge.lock().unwrap().contains(&pr_id) {
            return Err(Error::Api {
                status: 409,
                message: "merge conflicts".to_string(),
            });
        }
        if let Some(prs) = self.pull_requests.lock().unwrap().get_mut(repository_id) {
            prs.retain(|pr| pr.id != pr_id);
        }
        Ok(())
    }

    async fn latest_pipeline_run(
        &self,
        repository_id: &RepositoryId,
    ) -> Result<Option<PipelineRun>> {
        self.poll_calls.lock().unwrap().push(repository_id.clone());
        let delay = self.poll_delays.lock().unwrap().get(repository_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let answer = {
            let mut polls = self.polls.lock().unwrap();
            let Some(queue) = polls.get_mut(repository_id) else {
                return Ok(None);
            };
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };
        match answer {
            Some(PollAnswer::Run(run)) => Ok(Some(run)),
            Some(PollAnswer::NoRun) | None => Ok(None),
            Some(PollAnswer::Fail(msg)) => Err(Error::Api {
                status: 503,
                message: msg,
            }),
        }
    }

    async fn pipeline_run(&self, repository_id: &RepositoryId, run_id: u64) -> Result<PipelineRun> {
        self.poll_calls.lock().unwrap().push(repository_id.clone());
        self.pinned_runs
            .lock()
            .unwrap()
            .get(&(repository_id.clone(), run_id))
            .cloned()
            .ok_or_else(|| Error::Api {
                status: 404,
                message: format!("build {run_id} not found"),
            })
    }
}
