//! Watch session state machine
//!
//! Pure bookkeeping for one watch invocation: every repository starts
//! `Pending` and moves exactly once to `Resolved` or `TimedOut` (or, in
//! single-pass mode, is frozen as a `Pending` snapshot). Timestamps are
//! passed in so transitions can be tested without a clock.

use crate::error::{Error, Result};
use crate::types::{PipelineRun, RepositoryId, WatchResult, WatchStatus};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Longest span a deadline or tick is scheduled ahead
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn instant_after(now: Instant, span: Duration) -> Instant {
    now.checked_add(span.min(FAR_FUTURE)).unwrap_or(now)
}

/// Options for a watch invocation
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Poll every repository exactly once
    pub once: bool,
    /// Time allowed for runs to resolve
    pub timeout: Duration,
    /// Delay between polls
    pub poll_interval: Duration,
    /// Runs to follow by id instead of the latest run
    pub pinned_runs: HashMap<RepositoryId, u64>,
}

impl WatchOptions {
    /// Options from the minute/second knobs users configure
    pub fn new(timeout_minutes: u64, poll_seconds: u64) -> Self {
        Self {
            once: false,
            timeout: Duration::from_secs(timeout_minutes.saturating_mul(60)),
            poll_interval: Duration::from_secs(poll_seconds),
            pinned_runs: HashMap::new(),
        }
    }

    /// Switch single-pass mode on or off
    #[must_use]
    pub const fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Follow a specific run for a repository
    #[must_use]
    pub fn with_pinned_run(mut self, repository_id: RepositoryId, run_id: u64) -> Self {
        self.pinned_runs.insert(repository_id, run_id);
        self
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::new(60, 20)
    }
}

#[derive(Debug)]
struct RepositoryWatch {
    repository_id: RepositoryId,
    status: WatchStatus,
    pinned_run: Option<u64>,
    last_run: Option<PipelineRun>,
    attempts: u32,
    last_error: Option<String>,
    settled: bool,
    elapsed: Duration,
}

impl RepositoryWatch {
    fn to_result(&self) -> WatchResult {
        WatchResult {
            repository_id: self.repository_id.clone(),
            status: self.status,
            final_state: self.last_run.as_ref().map(|r| r.state),
            resolved_within_deadline: self.status == WatchStatus::Resolved,
            elapsed: self.elapsed,
            run: self.last_run.clone(),
            attempts: self.attempts,
            last_error: self.last_error.clone(),
        }
    }
}

/// State of one watch invocation, owned by the watch loop
#[derive(Debug)]
pub struct WatchSession {
    started_at: Instant,
    deadline: Instant,
    poll_interval: Duration,
    repositories: Vec<RepositoryWatch>,
}

impl WatchSession {
    /// Start a session at `now`
    ///
    /// Duplicate repository ids are dropped, keeping the first occurrence.
    pub fn new(
        repository_ids: &[RepositoryId],
        options: &WatchOptions,
        now: Instant,
    ) -> Result<Self> {
        if options.poll_interval.is_zero() {
            return Err(Error::Config(
                "poll interval must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let repositories = repository_ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .map(|id| RepositoryWatch {
                repository_id: id.clone(),
                status: WatchStatus::Pending,
                pinned_run: options.pinned_runs.get(id).copied(),
                last_run: None,
                attempts: 0,
                last_error: None,
                settled: false,
                elapsed: Duration::ZERO,
            })
            .collect();

        Ok(Self {
            started_at: now,
            deadline: instant_after(now, options.timeout),
            poll_interval: options.poll_interval,
            repositories,
        })
    }

    /// Repositories still waiting, with their pinned run if any
    pub fn pending(&self) -> Vec<(RepositoryId, Option<u64>)> {
        self.repositories
            .iter()
            .filter(|r| !r.settled)
            .map(|r| (r.repository_id.clone(), r.pinned_run))
            .collect()
    }

    /// Whether every repository has settled
    pub fn is_done(&self) -> bool {
        self.repositories.iter().all(|r| r.settled)
    }

    /// Whether the deadline has passed at `now`
    pub fn deadline_reached(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// When the next tick should start: one interval from `now`, never past
    /// the deadline
    pub fn next_tick(&self, now: Instant) -> Instant {
        instant_after(now, self.poll_interval).min(self.deadline)
    }

    /// Record one poll outcome
    ///
    /// Returns the repository's result if this poll resolved it. Fetch errors
    /// leave the repository pending; the next tick retries it.
    pub fn record_poll(
        &mut self,
        repository_id: &RepositoryId,
        outcome: Result<Option<PipelineRun>>,
        now: Instant,
    ) -> Option<WatchResult> {
        let elapsed = now.saturating_duration_since(self.started_at);
        let repo = self
            .repositories
            .iter_mut()
            .find(|r| &r.repository_id == repository_id && !r.settled)?;
        repo.attempts += 1;

        match outcome {
            Ok(Some(run)) => {
                repo.last_error = None;
                let terminal = run.state.is_terminal();
                debug!(%repository_id, run_id = run.run_id, state = %run.state, "observed run");
                repo.last_run = Some(run);
                if terminal {
                    repo.status = WatchStatus::Resolved;
                    repo.settled = true;
                    repo.elapsed = elapsed;
                    let result = repo.to_result();
                    info!(%repository_id, state = ?result.final_state, "pipeline resolved");
                    return Some(result);
                }
            }
            Ok(None) => {
                repo.last_error = None;
                debug!(%repository_id, "no pipeline run yet");
            }
            Err(e) => {
                warn!(%repository_id, attempt = repo.attempts, error = %e, "pipeline fetch failed");
                repo.last_error = Some(e.to_string());
            }
        }
        None
    }

    /// Freeze every unsettled repository as a `Pending` snapshot
    pub fn finish_single_pass(&mut self, now: Instant) -> Vec<WatchResult> {
        self.settle_remaining(WatchStatus::Pending, now)
    }

    /// Mark every unsettled repository `TimedOut`
    pub fn time_out_pending(&mut self, now: Instant) -> Vec<WatchResult> {
        let timed_out = self.settle_remaining(WatchStatus::TimedOut, now);
        for result in &timed_out {
            warn!(
                repository_id = %result.repository_id,
                attempts = result.attempts,
                last_error = result.last_error.as_deref(),
                "pipeline watch timed out"
            );
        }
        timed_out
    }

    fn settle_remaining(&mut self, status: WatchStatus, now: Instant) -> Vec<WatchResult> {
        let elapsed = now.saturating_duration_since(self.started_at);
        self.repositories
            .iter_mut()
            .filter(|r| !r.settled)
            .map(|repo| {
                repo.status = status;
                repo.settled = true;
                repo.elapsed = elapsed;
                repo.to_result()
            })
            .collect()
    }

    /// Results in the order repositories were given
    pub fn into_results(self) -> Vec<WatchResult> {
        self.repositories.iter().map(RepositoryWatch::to_result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunState;

    fn ids(names: &[&str]) -> Vec<RepositoryId> {
        names.iter().map(|n| RepositoryId::from(*n)).collect()
    }

    fn run(repo: &str, state: RunState) -> PipelineRun {
        PipelineRun {
            repository_id: RepositoryId::from(repo),
            run_id: 7,
            build_number: None,
            state,
            partially_succeeded: false,
            started_at: None,
            finished_at: None,
            url: None,
        }
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let options = WatchOptions::new(10, 0);
        let err = WatchSession::new(&ids(&["R1"]), &options, Instant::now()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_duplicates_dropped_in_order() {
        let session = WatchSession::new(
            &ids(&["R2", "R1", "R2"]),
            &WatchOptions::default(),
            Instant::now(),
        )
        .unwrap();
        let pending: Vec<_> = session.pending().into_iter().map(|(id, _)| id).collect();
        assert_eq!(pending, ids(&["R2", "R1"]));
    }

    #[test]
    fn test_terminal_run_resolves_once() {
        let now = Instant::now();
        let mut session =
            WatchSession::new(&ids(&["R1", "R2"]), &WatchOptions::default(), now).unwrap();
        let r1 = RepositoryId::from("R1");

        let resolved = session
            .record_poll(&r1, Ok(Some(run("R1", RunState::Failed))), now + Duration::from_secs(5))
            .unwrap();
        assert_eq!(resolved.status, WatchStatus::Resolved);
        assert_eq!(resolved.final_state, Some(RunState::Failed));
        assert!(resolved.resolved_within_deadline);
        assert_eq!(resolved.elapsed, Duration::from_secs(5));

        // Settled repositories ignore further polls
        assert!(
            session
                .record_poll(&r1, Ok(Some(run("R1", RunState::Succeeded))), now)
                .is_none()
        );
        assert_eq!(session.pending().len(), 1);
        assert!(!session.is_done());
    }

    #[test]
    fn test_running_and_errors_stay_pending() {
        let now = Instant::now();
        let mut session =
            WatchSession::new(&ids(&["R1"]), &WatchOptions::default(), now).unwrap();
        let r1 = RepositoryId::from("R1");

        assert!(
            session
                .record_poll(&r1, Ok(Some(run("R1", RunState::Running))), now)
                .is_none()
        );
        assert!(
            session
                .record_poll(&r1, Err(Error::Internal("boom".to_string())), now)
                .is_none()
        );
        assert!(session.record_poll(&r1, Ok(None), now).is_none());
        assert_eq!(session.pending().len(), 1);

        let results = session.time_out_pending(now + Duration::from_secs(60));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, WatchStatus::TimedOut);
        assert_eq!(results[0].attempts, 3);
        assert_eq!(results[0].final_state, Some(RunState::Running));
        assert!(!results[0].resolved_within_deadline);
        assert!(session.is_done());
    }

    #[test]
    fn test_last_error_retained_on_timeout() {
        let now = Instant::now();
        let mut session =
            WatchSession::new(&ids(&["R1"]), &WatchOptions::default(), now).unwrap();
        let r1 = RepositoryId::from("R1");
        session.record_poll(&r1, Err(Error::Internal("first".to_string())), now);
        session.record_poll(&r1, Err(Error::Internal("second".to_string())), now);

        let results = session.time_out_pending(now);
        assert_eq!(results[0].final_state, None);
        assert!(results[0].last_error.as_deref().unwrap().contains("second"));
    }

    #[test]
    fn test_single_pass_snapshot() {
        let now = Instant::now();
        let mut session = WatchSession::new(
            &ids(&["R1", "R2"]),
            &WatchOptions::default().with_once(true),
            now,
        )
        .unwrap();
        session.record_poll(
            &RepositoryId::from("R1"),
            Ok(Some(run("R1", RunState::Succeeded))),
            now,
        );
        session.record_poll(
            &RepositoryId::from("R2"),
            Ok(Some(run("R2", RunState::Running))),
            now,
        );
        let snapshot = session.finish_single_pass(now);
        assert_eq!(snapshot.len(), 1);

        let results = session.into_results();
        assert_eq!(results[0].status, WatchStatus::Resolved);
        assert!(results[0].resolved_within_deadline);
        assert_eq!(results[1].status, WatchStatus::Pending);
        assert_eq!(results[1].final_state, Some(RunState::Running));
        assert!(!results[1].resolved_within_deadline);
    }

    #[test]
    fn test_next_tick_clamped_to_deadline() {
        let now = Instant::now();
        let options = WatchOptions {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(20),
            ..WatchOptions::default()
        };
        let session = WatchSession::new(&ids(&["R1"]), &options, now).unwrap();
        assert_eq!(session.next_tick(now), now + Duration::from_secs(20));
        assert_eq!(
            session.next_tick(now + Duration::from_secs(20)),
            now + Duration::from_secs(30)
        );
        assert!(!session.deadline_reached(now + Duration::from_secs(29)));
        assert!(session.deadline_reached(now + Duration::from_secs(30)));
    }

    #[test]
    fn test_unbounded_durations_saturate() {
        let now = Instant::now();
        let options = WatchOptions {
            timeout: Duration::MAX,
            poll_interval: Duration::MAX,
            ..WatchOptions::default()
        };
        let session = WatchSession::new(&ids(&["R1"]), &options, now).unwrap();
        assert!(session.next_tick(now) > now + Duration::from_secs(86_400 * 365));
        assert!(!session.deadline_reached(now + Duration::from_secs(86_400 * 365)));

        let short = WatchOptions {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::MAX,
            ..WatchOptions::default()
        };
        let session = WatchSession::new(&ids(&["R1"]), &short, now).unwrap();
        assert_eq!(session.next_tick(now), now + Duration::from_secs(60));
    }

    #[test]
    fn test_pinned_runs_carried() {
        let options = WatchOptions::default().with_pinned_run(RepositoryId::from("R2"), 99);
        let session =
            WatchSession::new(&ids(&["R1", "R2"]), &options, Instant::now()).unwrap();
        let pending = session.pending();
        assert_eq!(pending[0].1, None);
        assert_eq!(pending[1].1, Some(99));
    }
}
