//! Shared test utilities

#![allow(dead_code)]

mod mock_client;

pub use mock_client::{ApproveCall, MergeCall, MockRepositoryClient, PollAnswer};

use async_trait::async_trait;
use qas_gate::config::Config;
use qas_gate::error::{Error, Result};
use qas_gate::notify::{Message, Notifier};
use qas_gate::types::{MergeStatus, PipelineRun, PullRequest, RepositoryId, ReviewerVote, RunState};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reviewer id used across tests
pub const REVIEWER: &str = "7b3c1f0e-0000-4000-8000-00000000beef";

/// Notifier that records every message
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<Message>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail (the message is still recorded)
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &Message) -> Result<()> {
        self.messages.lock().unwrap().push(message.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Notification("webhook answered 500".to_string()));
        }
        Ok(())
    }
}

/// Config with the given repositories (id = alias) and reviewer
pub fn test_config(repos: &[&str], reviewer: Option<&str>) -> Config {
    let mut toml = String::from("organization = \"contoso\"\nproject = \"Platform\"\n");
    if let Some(reviewer) = reviewer {
        toml.push_str(&format!("reviewer_id = \"{reviewer}\"\n"));
    }
    for repo in repos {
        toml.push_str(&format!(
            "\n[[repositories]]\nid = \"{repo}\"\nalias = \"{repo}-app\"\n"
        ));
    }
    Config::from_toml_str(&toml).unwrap()
}

/// Active PR into `target` with no votes
pub fn make_pr(repo: &str, id: u64, target: &str) -> PullRequest {
    PullRequest {
        id,
        repository_id: RepositoryId::from(repo),
        title: format!("Promote #{id}"),
        source_branch: "refs/heads/develop".to_string(),
        target_branch: format!("refs/heads/{target}"),
        reviewer_votes: HashMap::new(),
        merge_status: MergeStatus::Succeeded,
        last_merge_source_commit: Some(format!("{id:040x}")),
        url: None,
    }
}

/// Same PR, with a vote already cast
pub fn with_vote(mut pr: PullRequest, reviewer: &str, vote: ReviewerVote) -> PullRequest {
    pr.reviewer_votes.insert(reviewer.to_string(), vote);
    pr
}

/// Pipeline run in the given state
pub fn make_run(repo: &str, run_id: u64, state: RunState) -> PipelineRun {
    PipelineRun {
        repository_id: RepositoryId::from(repo),
        run_id,
        build_number: Some(format!("20250101.{run_id}")),
        state,
        partially_succeeded: false,
        started_at: None,
        finished_at: None,
        url: Some(format!(
            "https://dev.azure.com/contoso/Platform/_build/results?buildId={run_id}"
        )),
    }
}

pub fn ids(repos: &[&str]) -> Vec<RepositoryId> {
    repos.iter().map(|r| RepositoryId::from(*r)).collect()
}
