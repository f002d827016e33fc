//! qasgate - approve QAS promotion PRs and watch their pipelines

mod cli;

use clap::{ArgAction, Parser, Subcommand};
use cli::{ApproveOptions, GlobalArgs, WatchArgs};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Approve and merge QAS promotion PRs on Azure DevOps, then watch the
/// pipelines they trigger
#[derive(Parser, Debug)]
#[command(name = "qasgate")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Approve and merge open PRs into the promotion branch
    ApproveMerge {
        /// Repository id or alias (repeatable; default: configured set)
        #[arg(long = "repo", value_name = "ID")]
        repos: Vec<String>,

        /// Only process these PR ids (repeatable)
        #[arg(long = "pr", value_name = "ID")]
        prs: Vec<u64>,

        /// Show what would be processed without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Watch the latest pipeline runs and post a summary
    Watch(WatchArgs),

    /// Show the latest pipeline run of each repository
    Status {
        /// Repository id or alias (repeatable; default: configured set)
        #[arg(long = "repo", value_name = "ID")]
        repos: Vec<String>,
    },

    /// List open PRs into the promotion branch
    Prs {
        /// Repository id or alias (repeatable; default: configured set)
        #[arg(long = "repo", value_name = "ID")]
        repos: Vec<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "warn,qas_gate=info,qasgate=info",
        _ => "info,qas_gate=debug,qasgate=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ok = match cli.command {
        Commands::ApproveMerge {
            repos,
            prs,
            dry_run,
            yes,
        } => {
            cli::run_approve_merge(
                &cli.global,
                ApproveOptions {
                    repos,
                    prs,
                    dry_run,
                    yes,
                },
            )
            .await?
        }
        Commands::Watch(args) => cli::run_watch(&cli.global, args).await?,
        Commands::Status { repos } => cli::run_status(&cli.global, &repos).await?,
        Commands::Prs { repos } => cli::run_prs(&cli.global, &repos).await?,
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
