//! Configuration loading
//!
//! Configuration lives in a TOML file (see `qasgate.example.toml`). It is read
//! once, validated, and then shared immutably. Secrets (the PAT) never live in
//! the file; see [`crate::auth`].

use crate::error::{Error, Result};
use crate::types::RepositoryId;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name under the user's config dir
const CONFIG_DIR: &str = "qasgate";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_in_flight_requests() -> usize {
    8
}

const fn default_timeout_min() -> u64 {
    60
}

const fn default_poll_sec() -> u64 {
    20
}

fn default_api_version() -> String {
    "7.1".to_string()
}

fn default_promotion_branch() -> String {
    "qas".to_string()
}

/// Strategy the platform uses to complete a PR
///
/// Opaque to the orchestration logic; only the Azure DevOps client reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    /// Squash all commits into one
    Squash,
    /// Merge commit, never fast-forward
    #[default]
    NoFastForward,
    /// Rebase and fast-forward
    Rebase,
    /// Rebase and create a merge commit
    RebaseMerge,
}

impl MergeStrategy {
    /// Name used by the Azure DevOps REST API
    pub const fn as_api_str(self) -> &'static str {
        match self {
            Self::Squash => "squash",
            Self::NoFastForward => "noFastForward",
            Self::Rebase => "rebase",
            Self::RebaseMerge => "rebaseMerge",
        }
    }
}

/// Completion options sent with every merge
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeOptions {
    /// Merge strategy
    #[serde(default)]
    pub strategy: MergeStrategy,
    /// Delete the source branch after completion
    #[serde(default)]
    pub delete_source_branch: bool,
    /// Bypass branch policies (requires the permission on the token)
    #[serde(default)]
    pub bypass_policy: bool,
}

/// Default watch policy
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchDefaults {
    /// Minutes to wait for runs to resolve
    #[serde(default = "default_timeout_min")]
    pub timeout_min: u64,
    /// Seconds between polls
    #[serde(default = "default_poll_sec")]
    pub poll_sec: u64,
}

impl Default for WatchDefaults {
    fn default() -> Self {
        Self {
            timeout_min: default_timeout_min(),
            poll_sec: default_poll_sec(),
        }
    }
}

/// A repository in the default set
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Repository GUID
    pub id: RepositoryId,
    /// Readable name used in output and notifications
    pub alias: Option<String>,
    /// Project hosting the repository's pipelines, if not the default project
    pub project: Option<String>,
    /// Build definition to watch when the repository has several pipelines
    pub definition_id: Option<u64>,
}

/// Process-wide configuration, immutable once loaded
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Azure DevOps organization
    pub organization: String,
    /// Default project
    pub project: String,
    /// REST API version
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Branch whose incoming PRs are approved and merged
    #[serde(default = "default_promotion_branch")]
    pub promotion_branch: String,
    /// Reviewer identity (GUID) used to approve
    pub reviewer_id: Option<String>,
    /// Teams incoming webhook URL
    pub webhook_url: Option<String>,
    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum PRs approved/merged concurrently (unbounded when absent)
    pub max_concurrency: Option<usize>,
    /// Maximum outbound requests in flight across all operations
    #[serde(default = "default_max_in_flight_requests")]
    pub max_in_flight_requests: usize,
    /// Merge completion options
    #[serde(default)]
    pub merge: MergeOptions,
    /// Watch defaults
    #[serde(default)]
    pub watch: WatchDefaults,
    /// Default repository set, in processing order
    pub repositories: Vec<RepositoryConfig>,
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path().ok_or_else(|| {
                Error::Config("no config path given and no user config directory".to_string())
            })?,
        };

        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() {
            return Err(Error::Config("organization must not be empty".to_string()));
        }
        if self.project.trim().is_empty() {
            return Err(Error::Config("project must not be empty".to_string()));
        }
        if self.promotion_branch.trim().is_empty() {
            return Err(Error::Config("promotion_branch must not be empty".to_string()));
        }
        if self.repositories.is_empty() {
            return Err(Error::Config("at least one repository is required".to_string()));
        }
        if self.watch.poll_sec == 0 {
            return Err(Error::Config("watch.poll_sec must be greater than 0".to_string()));
        }
        if self.max_in_flight_requests == 0 {
            return Err(Error::Config(
                "max_in_flight_requests must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrency == Some(0) {
            return Err(Error::Config("max_concurrency must be greater than 0".to_string()));
        }

        let mut seen = HashSet::new();
        for repo in &self.repositories {
            if repo.id.as_str().trim().is_empty() {
                return Err(Error::Config("repository id must not be empty".to_string()));
            }
            if !seen.insert(repo.id.as_str().to_ascii_lowercase()) {
                return Err(Error::Config(format!("duplicate repository id {}", repo.id)));
            }
        }

        if let Some(ref webhook) = self.webhook_url {
            url::Url::parse(webhook)
                .map_err(|e| Error::Config(format!("invalid webhook_url: {e}")))?;
        }

        Ok(())
    }

    /// The default repository set, in configured order
    pub fn default_repository_ids(&self) -> Vec<RepositoryId> {
        self.repositories.iter().map(|r| r.id.clone()).collect()
    }

    /// Look up a configured repository by id
    pub fn repository(&self, id: &RepositoryId) -> Option<&RepositoryConfig> {
        self.repositories
            .iter()
            .find(|r| r.id.as_str().eq_ignore_ascii_case(id.as_str()))
    }

    /// Readable name of a repository (alias, or the id itself)
    pub fn alias_for<'a>(&'a self, id: &'a RepositoryId) -> &'a str {
        self.repository(id)
            .and_then(|r| r.alias.as_deref())
            .unwrap_or_else(|| id.as_str())
    }

    /// Project hosting a repository's pipelines
    pub fn project_for(&self, id: &RepositoryId) -> &str {
        self.repository(id)
            .and_then(|r| r.project.as_deref())
            .unwrap_or(&self.project)
    }

    /// Pinned build definition for a repository, if any
    pub fn definition_for(&self, id: &RepositoryId) -> Option<u64> {
        self.repository(id).and_then(|r| r.definition_id)
    }

    /// Resolve a CLI argument that is either a repository id or an alias
    ///
    /// Unknown GUID-looking arguments are accepted as-is so repositories outside
    /// the default set can still be targeted.
    pub fn resolve_repository(&self, arg: &str) -> Result<RepositoryId> {
        if let Some(repo) = self
            .repositories
            .iter()
            .find(|r| r.id.as_str().eq_ignore_ascii_case(arg))
        {
            return Ok(repo.id.clone());
        }
        if let Some(repo) = self
            .repositories
            .iter()
            .find(|r| r.alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(arg)))
        {
            return Ok(repo.id.clone());
        }
        if looks_like_guid(arg) {
            return Ok(RepositoryId::from(arg));
        }
        Err(Error::UnknownRepository(arg.to_string()))
    }

    /// Per-request HTTP timeout
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Default config location: `<config dir>/qasgate/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
}

fn looks_like_guid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}
