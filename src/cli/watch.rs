//! Watch command - follow pipeline runs until they resolve

use crate::cli::context::{CommandContext, GlobalArgs};
use crate::cli::format_result;
use crate::cli::style::{Stylize, check, spinner_style};
use anstream::println;
use clap::Args;
use indicatif::ProgressBar;
use qas_gate::config::Config;
use qas_gate::error::Result;
use qas_gate::types::{RunState, WatchResult};
use qas_gate::watch::{WatchOptions, WatchProgress};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Arguments for the watch command
#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Repository id or alias (repeatable; default: configured set)
    #[arg(long = "repo", value_name = "ID")]
    pub repos: Vec<String>,

    /// Poll once and report the current state
    #[arg(long)]
    pub once: bool,

    /// Minutes to wait for runs to resolve
    #[arg(long, value_name = "N")]
    pub timeout_min: Option<u64>,

    /// Seconds between polls
    #[arg(long, value_name = "N")]
    pub poll_sec: Option<u64>,

    /// Follow a specific run instead of the latest (repeatable)
    #[arg(long = "run", value_name = "REPO=RUN_ID", value_parser = parse_pinned_run)]
    pub runs: Vec<(String, u64)>,
}

fn parse_pinned_run(s: &str) -> std::result::Result<(String, u64), String> {
    let (repo, run) = s
        .split_once('=')
        .ok_or_else(|| format!("expected REPO=RUN_ID, got '{s}'"))?;
    let run = run
        .trim()
        .parse()
        .map_err(|_| format!("invalid run id '{run}'"))?;
    Ok((repo.trim().to_string(), run))
}

/// Spinner-backed progress for the watch loop
struct CliProgress {
    spinner: ProgressBar,
    config: Arc<Config>,
}

impl WatchProgress for CliProgress {
    fn on_result(&self, result: &WatchResult) {
        let name = self.config.alias_for(&result.repository_id);
        self.spinner
            .suspend(|| println!("{}", format_result(name, result)));
    }

    fn on_tick(&self, pending: usize) {
        self.spinner
            .set_message(format!("Waiting on {pending} pipeline(s)..."));
    }
}

/// Run the watch command
///
/// Returns `false` when any run failed or timed out.
pub async fn run_watch(global: &GlobalArgs, args: WatchArgs) -> Result<bool> {
    let ctx = CommandContext::new(global, false)?;
    let repositories = ctx.repositories(&args.repos)?;

    let mut options = WatchOptions::new(
        args.timeout_min.unwrap_or(ctx.config.watch.timeout_min),
        args.poll_sec.unwrap_or(ctx.config.watch.poll_sec),
    )
    .with_once(args.once);
    for (repo, run_id) in &args.runs {
        options = options.with_pinned_run(ctx.config.resolve_repository(repo)?, *run_id);
    }

    ctx.client.verify_access().await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping watch");
            on_interrupt.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message("Polling pipelines...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    let progress = CliProgress {
        spinner: spinner.clone(),
        config: Arc::clone(&ctx.config),
    };

    let results = ctx
        .orchestrator
        .watch_and_notify(repositories.as_deref(), &options, &cancel, &progress)
        .await;
    spinner.finish_and_clear();
    let results = results?;

    let succeeded = results.iter().filter(|r| r.succeeded()).count();
    let failed = results
        .iter()
        .filter(|r| {
            r.error_kind().is_some()
                || matches!(r.final_state, Some(RunState::Failed | RunState::Canceled))
        })
        .count();

    println!();
    if cancel.is_cancelled() {
        println!("{}", "Watch interrupted.".warn());
    }
    let mark = if failed == 0 { check() } else { "⚠".warn() };
    let label = if args.once { " (snapshot)" } else { "" };
    println!("{mark} {succeeded}/{} succeeded{label}", results.len());

    Ok(failed == 0)
}
