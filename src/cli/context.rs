//! Shared command context for CLI commands
//!
//! Loads configuration, resolves credentials, and wires the Azure DevOps
//! client and the notifier into an [`Orchestrator`].

use clap::Args;
use qas_gate::auth::{CredentialSources, process_env, stdin_is_terminal};
use qas_gate::config::Config;
use qas_gate::error::{Error, Result};
use qas_gate::notify::{NoopNotifier, Notifier, TeamsNotifier};
use qas_gate::orchestrator::Orchestrator;
use qas_gate::platform::AzureDevOpsClient;
use qas_gate::types::RepositoryId;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (default: <config dir>/qasgate/config.toml)
    #[arg(long, global = true, env = "QASGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Azure DevOps personal access token
    #[arg(long, global = true, hide_env_values = true)]
    pub pat: Option<String>,

    /// Reviewer identity (GUID) used to approve
    #[arg(long, global = true)]
    pub reviewer_id: Option<String>,

    /// Teams incoming webhook URL
    #[arg(long, global = true)]
    pub webhook_url: Option<String>,
}

/// Shared context for CLI commands that talk to Azure DevOps
pub struct CommandContext {
    /// Loaded configuration with resolved reviewer and webhook
    pub config: Arc<Config>,
    /// Concrete client, for access checks
    pub client: Arc<AzureDevOpsClient>,
    /// Facade used by the commands
    pub orchestrator: Orchestrator,
}

impl CommandContext {
    /// Load config, resolve credentials, and build the orchestrator
    ///
    /// The reviewer id is only prompted for when `needs_reviewer` is set.
    pub fn new(args: &GlobalArgs, needs_reviewer: bool) -> Result<Self> {
        let mut config = Config::load(args.config.as_deref())?;
        let interactive = stdin_is_terminal();

        let sources = CredentialSources {
            pat_flag: args.pat.as_deref(),
            reviewer_flag: args.reviewer_id.as_deref(),
            webhook_flag: args.webhook_url.as_deref(),
            reviewer_config: config.reviewer_id.as_deref(),
            webhook_config: config.webhook_url.as_deref(),
            interactive,
            env: &process_env,
        };

        let pat = sources.pat()?;
        let reviewer = if needs_reviewer {
            sources.reviewer_id()?
        } else {
            CredentialSources {
                interactive: false,
                ..sources
            }
            .reviewer_id()?
        };
        let webhook = sources.webhook_url();

        config.reviewer_id = reviewer.map(|c| c.value);
        config.webhook_url = webhook.map(|c| c.value);
        if let Some(ref url) = config.webhook_url {
            url::Url::parse(url).map_err(|e| Error::Config(format!("invalid webhook URL: {e}")))?;
        }
        let config = Arc::new(config);

        let client = Arc::new(AzureDevOpsClient::new(&pat.value, Arc::clone(&config))?);
        let notifier: Arc<dyn Notifier> = match config.webhook_url {
            Some(ref url) => Arc::new(TeamsNotifier::new(url.clone())?),
            None => {
                debug!("no webhook configured, notifications disabled");
                Arc::new(NoopNotifier)
            }
        };

        let orchestrator = Orchestrator::new(Arc::clone(&config), client.clone(), notifier);

        Ok(Self {
            config,
            client,
            orchestrator,
        })
    }

    /// Resolve repository arguments (ids or aliases)
    ///
    /// `None` selects the configured default set.
    pub fn repositories(&self, args: &[String]) -> Result<Option<Vec<RepositoryId>>> {
        if args.is_empty() {
            return Ok(None);
        }
        args.iter()
            .map(|arg| self.config.resolve_repository(arg))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Readable name of a repository
    pub fn name_of(&self, id: &RepositoryId) -> String {
        self.config.alias_for(id).to_string()
    }
}
