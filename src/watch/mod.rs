//! Pipeline watch loop
//!
//! Polls the latest pipeline run of each repository on a fixed interval until
//! every repository resolves, the deadline passes, or the caller cancels.
//! Repositories are polled concurrently within a tick and resolve
//! independently of each other. Each poll is recorded as soon as it returns,
//! so a cancellation mid-tick keeps the runs already observed.

mod session;

pub use session::{WatchOptions, WatchSession};

use crate::error::Result;
use crate::platform::RepositoryClient;
use crate::types::{PipelineRun, RepositoryId, WatchResult};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Progress callback for watch sessions
pub trait WatchProgress: Send + Sync {
    /// Called when a repository settles (resolved, timed out, or snapshotted)
    fn on_result(&self, result: &WatchResult);

    /// Called before each tick with the number of repositories still pending
    fn on_tick(&self, _pending: usize) {}
}

/// Progress callback that does nothing
pub struct NoProgress;

impl WatchProgress for NoProgress {
    fn on_result(&self, _result: &WatchResult) {}
}

async fn fetch_run(
    client: &dyn RepositoryClient,
    repository_id: &RepositoryId,
    pinned_run: Option<u64>,
) -> Result<Option<PipelineRun>> {
    match pinned_run {
        Some(run_id) => client.pipeline_run(repository_id, run_id).await.map(Some),
        None => client.latest_pipeline_run(repository_id).await,
    }
}

/// Watch pipelines until they resolve (EFFECTFUL)
///
/// Returns one result per distinct repository, in the order given. The first
/// tick always polls, even with a zero timeout. Cancelling `cancel` stops
/// polling immediately; repositories still pending are reported `TimedOut`.
///
/// Only an invalid configuration (zero poll interval) is an error. Fetch
/// failures are retried on the next tick and end up in
/// [`WatchResult::last_error`].
pub async fn watch(
    client: &dyn RepositoryClient,
    repository_ids: &[RepositoryId],
    options: &WatchOptions,
    cancel: &CancellationToken,
    progress: &dyn WatchProgress,
) -> Result<Vec<WatchResult>> {
    let mut session = WatchSession::new(repository_ids, options, Instant::now())?;
    info!(
        repositories = session.pending().len(),
        once = options.once,
        timeout_secs = options.timeout.as_secs(),
        poll_secs = options.poll_interval.as_secs(),
        "starting pipeline watch"
    );

    while !session.is_done() {
        let pending = session.pending();
        progress.on_tick(pending.len());

        let mut polls: FuturesUnordered<_> = pending
            .iter()
            .map(|(id, pinned)| async move { (id, fetch_run(client, id, *pinned).await) })
            .collect();
        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                polled = polls.next() => {
                    let Some((id, outcome)) = polled else { break };
                    if let Some(result) = session.record_poll(id, outcome, Instant::now()) {
                        progress.on_result(&result);
                    }
                }
            }
        }
        drop(polls);

        let now = Instant::now();
        if cancelled {
            info!("pipeline watch cancelled");
            report(progress, session.time_out_pending(now));
            break;
        }

        if options.once {
            report(progress, session.finish_single_pass(now));
            break;
        }
        if session.is_done() {
            break;
        }
        if session.deadline_reached(now) {
            report(progress, session.time_out_pending(now));
            break;
        }

        let wake = session.next_tick(now);
        debug!(pending = session.pending().len(), "waiting for next tick");
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("pipeline watch cancelled");
                report(progress, session.time_out_pending(Instant::now()));
                break;
            }
            () = sleep_until(wake) => {}
        }
    }

    Ok(session.into_results())
}

fn report(progress: &dyn WatchProgress, results: Vec<WatchResult>) {
    for result in &results {
        progress.on_result(result);
    }
}
