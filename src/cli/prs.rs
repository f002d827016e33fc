//! Prs command - list open PRs into the promotion branch

use crate::cli::context::{CommandContext, GlobalArgs};
use crate::cli::style::{Stylize, cross};
use anstream::println;
use qas_gate::error::Result;
use qas_gate::types::short_branch_name;

/// Run the prs command
///
/// Returns `false` when any repository could not be listed.
pub async fn run_prs(global: &GlobalArgs, repos: &[String]) -> Result<bool> {
    let ctx = CommandContext::new(global, false)?;
    let repositories = ctx.repositories(repos)?;
    let has_reviewer = ctx.config.reviewer_id.is_some();

    let listings = ctx
        .orchestrator
        .list_promotion_prs(repositories.as_deref())
        .await;

    let mut ok = true;
    for listing in &listings {
        println!("{}", ctx.name_of(&listing.repository_id).emphasis());
        match listing.pull_requests {
            Err(ref e) => {
                ok = false;
                println!("  {} {}", cross(), e.error());
            }
            Ok(ref prs) if prs.is_empty() => println!("  {}", "no open PRs".muted()),
            Ok(ref prs) => {
                for pr in prs {
                    let marker = if !has_reviewer {
                        String::new()
                    } else if pr.eligible {
                        format!(" {}", "[pending approval]".accent())
                    } else {
                        format!(" {}", "[approved]".success())
                    };
                    println!(
                        "  #{} {}{marker}",
                        pr.pull_request.id,
                        pr.pull_request.title
                    );
                    println!(
                        "    {}",
                        format!(
                            "{} -> {}",
                            short_branch_name(&pr.pull_request.source_branch),
                            short_branch_name(&pr.pull_request.target_branch)
                        )
                        .muted()
                    );
                }
            }
        }
    }
    Ok(ok)
}
