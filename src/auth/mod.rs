//! Credential resolution
//!
//! The PAT, reviewer id, and webhook URL come from CLI flags, environment
//! variables, the config file, or an interactive prompt, in that order. The
//! PAT is never read from the config file.

use crate::error::{Error, Result};
use dialoguer::{Input, Password};
use std::fmt;
use std::io::IsTerminal;
use tracing::debug;

/// Agent token exposed to pipeline jobs
pub const PIPELINE_TOKEN_VAR: &str = "SYSTEM_ACCESSTOKEN";
/// Personal access token
pub const PAT_VAR: &str = "AZURE_DEVOPS_PAT";
/// Reviewer identity
pub const REVIEWER_VAR: &str = "REVIEWER_ID";
/// Teams incoming webhook
pub const WEBHOOK_VAR: &str = "TEAMS_WEBHOOK_URL";

/// Where a credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Command-line flag
    Flag,
    /// Environment variable
    EnvVar(&'static str),
    /// Config file
    ConfigFile,
    /// Interactive prompt
    Prompt,
}

impl fmt::Display for AuthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => write!(f, "command line"),
            Self::EnvVar(name) => write!(f, "${name}"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Prompt => write!(f, "prompt"),
        }
    }
}

/// A resolved credential
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// The value
    pub value: String,
    /// Where it came from
    pub source: AuthSource,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Inputs for credential resolution
///
/// Environment lookup is injected so resolution can be tested without
/// touching the process environment.
pub struct CredentialSources<'a> {
    /// Value of `--pat`
    pub pat_flag: Option<&'a str>,
    /// Value of `--reviewer-id`
    pub reviewer_flag: Option<&'a str>,
    /// Value of `--webhook-url`
    pub webhook_flag: Option<&'a str>,
    /// Reviewer id from the config file
    pub reviewer_config: Option<&'a str>,
    /// Webhook URL from the config file
    pub webhook_config: Option<&'a str>,
    /// Whether prompting is allowed
    pub interactive: bool,
    /// Environment lookup
    pub env: &'a dyn Fn(&str) -> Option<String>,
}

impl CredentialSources<'_> {
    fn first_of(
        &self,
        flag: Option<&str>,
        vars: &[&'static str],
        config: Option<&str>,
    ) -> Option<Credential> {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        if let Some(value) = flag.and_then(non_empty) {
            return Some(Credential {
                value,
                source: AuthSource::Flag,
            });
        }
        for &var in vars {
            if let Some(value) = (self.env)(var).as_deref().and_then(non_empty) {
                return Some(Credential {
                    value,
                    source: AuthSource::EnvVar(var),
                });
            }
        }
        config.and_then(non_empty).map(|value| Credential {
            value,
            source: AuthSource::ConfigFile,
        })
    }

    /// Resolve the personal access token
    pub fn pat(&self) -> Result<Credential> {
        if let Some(credential) = self.first_of(self.pat_flag, &[PIPELINE_TOKEN_VAR, PAT_VAR], None)
        {
            debug!(source = %credential.source, "using PAT");
            return Ok(credential);
        }
        if !self.interactive {
            return Err(Error::Auth(format!(
                "no PAT found; pass --pat or set ${PAT_VAR}"
            )));
        }

        let value = Password::new()
            .with_prompt("Azure DevOps PAT")
            .interact()
            .map_err(|e| Error::Auth(format!("failed to read PAT: {e}")))?;
        if value.trim().is_empty() {
            return Err(Error::Auth("empty PAT".to_string()));
        }
        Ok(Credential {
            value: value.trim().to_string(),
            source: AuthSource::Prompt,
        })
    }

    /// Resolve the reviewer id
    ///
    /// `None` when nothing is configured and prompting is not allowed; the
    /// approve operation then fails with a configuration error.
    pub fn reviewer_id(&self) -> Result<Option<Credential>> {
        if let Some(credential) =
            self.first_of(self.reviewer_flag, &[REVIEWER_VAR], self.reviewer_config)
        {
            debug!(source = %credential.source, "using reviewer id");
            return Ok(Some(credential));
        }
        if !self.interactive {
            return Ok(None);
        }

        let value: String = Input::new()
            .with_prompt("Reviewer id (GUID)")
            .interact_text()
            .map_err(|e| Error::Config(format!("failed to read reviewer id: {e}")))?;
        Ok(Some(Credential {
            value: value.trim().to_string(),
            source: AuthSource::Prompt,
        }))
    }

    /// Resolve the webhook URL (never prompted)
    pub fn webhook_url(&self) -> Option<Credential> {
        self.first_of(self.webhook_flag, &[WEBHOOK_VAR], self.webhook_config)
    }
}

/// Environment lookup backed by the process environment
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Whether prompts can be shown
pub fn stdin_is_terminal() -> bool {
    std::io::stdin().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sources<'a>(env: &'a dyn Fn(&str) -> Option<String>) -> CredentialSources<'a> {
        CredentialSources {
            pat_flag: None,
            reviewer_flag: None,
            webhook_flag: None,
            reviewer_config: None,
            webhook_config: None,
            interactive: false,
            env,
        }
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_flag_wins_over_env() {
        let env = env_of(&[(PAT_VAR, "from-env")]);
        let mut s = sources(&env);
        s.pat_flag = Some("from-flag");
        let pat = s.pat().unwrap();
        assert_eq!(pat.value, "from-flag");
        assert_eq!(pat.source, AuthSource::Flag);
    }

    #[test]
    fn test_pipeline_token_wins_over_pat_var() {
        let env = env_of(&[(PAT_VAR, "pat"), (PIPELINE_TOKEN_VAR, "agent")]);
        let pat = sources(&env).pat().unwrap();
        assert_eq!(pat.value, "agent");
        assert_eq!(pat.source, AuthSource::EnvVar(PIPELINE_TOKEN_VAR));
    }

    #[test]
    fn test_missing_pat_non_interactive() {
        let env = env_of(&[(PAT_VAR, "   ")]);
        let err = sources(&env).pat().unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_reviewer_env_then_config() {
        let env = env_of(&[]);
        let mut s = sources(&env);
        assert!(s.reviewer_id().unwrap().is_none());

        s.reviewer_config = Some("cfg-reviewer");
        let reviewer = s.reviewer_id().unwrap().unwrap();
        assert_eq!(reviewer.source, AuthSource::ConfigFile);

        let env = env_of(&[(REVIEWER_VAR, "env-reviewer")]);
        let mut s = sources(&env);
        s.reviewer_config = Some("cfg-reviewer");
        assert_eq!(s.reviewer_id().unwrap().unwrap().value, "env-reviewer");
    }

    #[test]
    fn test_webhook_optional() {
        let env = env_of(&[]);
        assert!(sources(&env).webhook_url().is_none());

        let env = env_of(&[(WEBHOOK_VAR, "https://hooks.example.test/x")]);
        let mut s = sources(&env);
        s.webhook_config = Some("https://hooks.example.test/cfg");
        assert_eq!(
            s.webhook_url().unwrap().value,
            "https://hooks.example.test/x"
        );
    }

    #[test]
    fn test_debug_redacts_value() {
        let credential = Credential {
            value: "secret".to_string(),
            source: AuthSource::Flag,
        };
        assert!(!format!("{credential:?}").contains("secret"));
    }
}
