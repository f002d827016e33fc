//! Approve-merge command - approve and complete promotion PRs

use crate::cli::context::{CommandContext, GlobalArgs};
use crate::cli::style::{Stylize, check, cross, spinner_style};
use anstream::println;
use dialoguer::Confirm;
use indicatif::ProgressBar;
use qas_gate::auth::stdin_is_terminal;
use qas_gate::error::{Error, Result};
use qas_gate::orchestrator::{MergeReport, RepositoryListing};
use qas_gate::types::{RepositoryId, short_branch_name};
use std::collections::HashSet;
use std::time::Duration;

/// Options for the approve-merge command
#[derive(Debug, Clone, Default)]
pub struct ApproveOptions {
    /// Repository ids or aliases (empty: configured set)
    pub repos: Vec<String>,
    /// PR ids to restrict to (empty: all eligible)
    pub prs: Vec<u64>,
    /// Show what would be processed without changing anything
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
}

/// Run the approve-merge command
///
/// Returns `false` when any PR or repository failed.
pub async fn run_approve_merge(global: &GlobalArgs, options: ApproveOptions) -> Result<bool> {
    let ctx = CommandContext::new(global, true)?;
    let repositories = ctx.repositories(&options.repos)?;
    let allowed: HashSet<u64> = options.prs.iter().copied().collect();
    let allowed = (!allowed.is_empty()).then_some(allowed);

    let confirm = !options.yes && stdin_is_terminal();
    if options.dry_run || confirm {
        let listings = ctx
            .orchestrator
            .list_promotion_prs(repositories.as_deref())
            .await;
        let count = report_plan(&ctx, &listings, allowed.as_ref());

        if options.dry_run {
            println!("{}", "Run without --dry-run to execute.".muted());
            return Ok(true);
        }
        if count == 0 {
            println!("{}", "No eligible PRs.".muted());
            return Ok(true);
        }
        if !Confirm::new()
            .with_prompt(format!("Approve and merge {count} PR(s)?"))
            .default(false)
            .interact()
            .map_err(|e| Error::Internal(format!("Failed to read confirmation: {e}")))?
        {
            println!("{}", "Aborted".muted());
            return Ok(true);
        }
        println!();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message(format!(
        "Approving and merging into {}...",
        ctx.config.promotion_branch.emphasis()
    ));
    spinner.enable_steady_tick(Duration::from_millis(80));

    let report = ctx
        .orchestrator
        .approve_and_merge_eligible(repositories.as_deref(), allowed.as_ref())
        .await;
    spinner.finish_and_clear();

    let report = report?;
    print_report(&ctx, &report);
    Ok(report.is_success())
}

/// Print the PRs a run would touch, returning how many are eligible
fn report_plan(
    ctx: &CommandContext,
    listings: &[RepositoryListing],
    allowed: Option<&HashSet<u64>>,
) -> usize {
    println!(
        "{} {}:",
        "PRs into".emphasis(),
        ctx.config.promotion_branch.accent()
    );
    println!();

    let mut eligible = 0;
    for listing in listings {
        println!("  {}", ctx.name_of(&listing.repository_id).emphasis());
        match listing.pull_requests {
            Err(ref e) => println!("    {} {}", cross(), e.error()),
            Ok(ref prs) if prs.is_empty() => println!("    {}", "no open PRs".muted()),
            Ok(ref prs) => {
                for pr in prs {
                    let requested = allowed.is_none_or(|ids| ids.contains(&pr.pull_request.id));
                    let label = if pr.eligible && requested {
                        eligible += 1;
                        "✓ Would merge".success()
                    } else if !pr.eligible {
                        "- Already approved".muted()
                    } else {
                        "- Not requested".muted()
                    };
                    println!(
                        "    {label} PR #{}: {} {}",
                        pr.pull_request.id,
                        pr.pull_request.title,
                        format!("({})", short_branch_name(&pr.pull_request.source_branch)).muted()
                    );
                }
            }
        }
    }
    println!();
    eligible
}

fn print_report(ctx: &CommandContext, report: &MergeReport) {
    let name = |id: &RepositoryId| ctx.name_of(id);

    for outcome in &report.outcomes {
        let repo = name(&outcome.repository_id);
        if outcome.is_success() {
            println!("{} {} PR #{} merged", check(), repo.emphasis(), outcome.pull_request_id);
        } else {
            let kind = outcome
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_default();
            println!(
                "{} {} PR #{} {}",
                cross(),
                repo.emphasis(),
                outcome.pull_request_id,
                kind.error()
            );
            if let Some(ref msg) = outcome.error_message {
                println!("    {}", msg.muted());
            }
        }
    }
    for skipped in &report.skipped {
        println!(
            "{} {} PR #{} {}",
            "-".muted(),
            name(&skipped.repository_id).emphasis(),
            skipped.pull_request_id,
            "already approved".muted()
        );
    }
    for failure in &report.failed_repositories {
        println!(
            "{} {} {}",
            cross(),
            name(&failure.repository_id).emphasis(),
            failure.error_kind.to_string().error()
        );
        println!("    {}", failure.message.muted());
    }
    if !report.missing_pull_request_ids.is_empty() {
        let ids: Vec<String> = report
            .missing_pull_request_ids
            .iter()
            .map(|id| format!("#{id}"))
            .collect();
        println!(
            "{} not found on {}: {}",
            "⚠".warn(),
            ctx.config.promotion_branch,
            ids.join(", ").warn()
        );
    }

    println!();
    let merged = report.outcomes.iter().filter(|o| o.is_success()).count();
    if report.outcomes.is_empty() && report.failed_repositories.is_empty() {
        println!("{}", "No eligible PRs.".muted());
    } else if report.is_success() {
        println!("{} {merged} PR(s) merged", check());
    } else {
        println!(
            "{} {merged}/{} PR(s) merged",
            "⚠".warn(),
            report.outcomes.len()
        );
    }
}
