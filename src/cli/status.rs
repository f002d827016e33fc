//! Status command - one-shot snapshot of the latest pipeline runs

use crate::cli::context::{CommandContext, GlobalArgs};
use crate::cli::format_result;
use crate::cli::style::Stylize;
use anstream::println;
use qas_gate::error::Result;

/// Run the status command
pub async fn run_status(global: &GlobalArgs, repos: &[String]) -> Result<bool> {
    let ctx = CommandContext::new(global, false)?;
    let repositories = ctx.repositories(repos)?;

    let results = ctx
        .orchestrator
        .pipeline_status(repositories.as_deref())
        .await?;

    println!(
        "{} {}:",
        "Latest runs on".emphasis(),
        ctx.config.promotion_branch.accent()
    );
    for result in &results {
        println!("  {}", format_result(&ctx.name_of(&result.repository_id), result));
    }
    Ok(true)
}
