//! Configuration
//!
//! Global flags, each also readable from the environment. Resolves them into
//! a [`Credential`] and the zone/account the commands act on.

use clap::Args;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cloudflare::client::ClientOptions;
use crate::cloudflare::credentials::Credential;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no authentication method detected")]
    NoCredential,

    #[error("need to have both API key and email set for legacy method")]
    IncompleteKeyPair,

    #[error("need `zone-name` or `zone-id` set")]
    MissingZone,

    #[error("`account-id` is required for this command")]
    MissingAccount,

    #[error("failed to read API token from Secret Manager: {0}")]
    SecretManager(String),
}

/// Zone addressed by id or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneSelector {
    Id(String),
    Name(String),
}

#[derive(Debug, Clone, Default, Args)]
pub struct CloudflareConfig {
    /// A scoped API token (preferred)
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", global = true, hide_env_values = true)]
    pub api_token: Option<String>,

    /// Cloudflare API email (legacy)
    #[arg(long, env = "CLOUDFLARE_API_EMAIL", global = true)]
    pub api_email: Option<String>,

    /// Cloudflare Global API key (legacy)
    #[arg(long, env = "CLOUDFLARE_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Domain name of your zone
    #[arg(long, env = "CLOUDFLARE_ZONE_NAME", global = true)]
    pub zone_name: Option<String>,

    /// Zone ID (takes precedence over zone name)
    #[arg(long, env = "CLOUDFLARE_ZONE_ID", global = true)]
    pub zone_id: Option<String>,

    /// Account ID
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID", global = true)]
    pub account_id: Option<String>,

    /// Maximum API requests per second
    #[arg(long, env = "CLOUDFLARE_RATE_LIMIT", global = true)]
    pub rate_limit: Option<u32>,

    /// Extra text appended to the user agent
    #[arg(long, env = "CLOUDFLARE_EXTRA_USER_AGENT", global = true)]
    pub extra_user_agent: Option<String>,

    /// GCP project holding the API token secret
    #[arg(long, env = "GCP_PROJECT_ID", global = true)]
    pub gcp_project: Option<String>,

    /// Secret Manager secret holding the API token
    #[arg(long, env = "CLOUDFLARE_TOKEN_SECRET", default_value = "cloudflare-api-token", global = true)]
    pub token_secret: String,
}

/// `Some` only for non-blank values; unset env vars often arrive as "".
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl CloudflareConfig {
    /// Build the credential from flags alone.
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        if let Some(token) = present(&self.api_token) {
            debug!("Using API token authentication");
            return Ok(Credential::token(token));
        }

        match (present(&self.api_email), present(&self.api_key)) {
            (Some(email), Some(key)) => {
                warn!("Using legacy method. Using API tokens is recommended");
                Ok(Credential::key_pair(email, key))
            }
            (None, None) => Err(ConfigError::NoCredential),
            _ => Err(ConfigError::IncompleteKeyPair),
        }
    }

    /// Build the credential, falling back to Secret Manager when no flag
    /// provides one and a GCP project is configured.
    pub async fn resolve_credential(&self) -> Result<Credential, ConfigError> {
        match self.credential() {
            Err(ConfigError::NoCredential) => self.credential_from_secret_manager().await,
            other => other,
        }
    }

    #[cfg(feature = "secret-manager")]
    async fn credential_from_secret_manager(&self) -> Result<Credential, ConfigError> {
        use crate::cloudflare::secrets::SecretManagerTokenSource;

        let Some(project) = present(&self.gcp_project) else {
            return Err(ConfigError::NoCredential);
        };
        debug!(project, secret = %self.token_secret, "Loading API token from Secret Manager");

        let source = SecretManagerTokenSource::connect(project)
            .await
            .map_err(|e| ConfigError::SecretManager(format!("{:#}", e)))?;
        let token = source
            .fetch_token(&self.token_secret)
            .await
            .map_err(|e| ConfigError::SecretManager(format!("{:#}", e)))?;
        Ok(Credential::token(token))
    }

    #[cfg(not(feature = "secret-manager"))]
    async fn credential_from_secret_manager(&self) -> Result<Credential, ConfigError> {
        Err(ConfigError::NoCredential)
    }

    pub fn zone(&self) -> Result<ZoneSelector, ConfigError> {
        if let Some(id) = present(&self.zone_id) {
            return Ok(ZoneSelector::Id(id.to_string()));
        }
        present(&self.zone_name)
            .map(|name| ZoneSelector::Name(name.to_string()))
            .ok_or(ConfigError::MissingZone)
    }

    pub fn account_id(&self) -> Result<&str, ConfigError> {
        present(&self.account_id).ok_or(ConfigError::MissingAccount)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            rate_limit: self.rate_limit,
            extra_user_agent: present(&self.extra_user_agent).map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CloudflareConfig {
        CloudflareConfig {
            token_secret: "cloudflare-api-token".to_string(),
            ..CloudflareConfig::default()
        }
    }

    #[test]
    fn test_token_is_preferred() {
        let cfg = CloudflareConfig {
            api_token: Some("tok".to_string()),
            api_email: Some("ops@example.com".to_string()),
            api_key: Some("key".to_string()),
            ..config()
        };
        assert_eq!(cfg.credential().unwrap(), Credential::token("tok"));
    }

    #[test]
    fn test_key_pair_requires_both_parts() {
        let cfg = CloudflareConfig {
            api_key: Some("key".to_string()),
            ..config()
        };
        assert!(matches!(cfg.credential(), Err(ConfigError::IncompleteKeyPair)));

        let cfg = CloudflareConfig {
            api_key: Some("key".to_string()),
            api_email: Some("ops@example.com".to_string()),
            ..config()
        };
        assert_eq!(
            cfg.credential().unwrap(),
            Credential::key_pair("ops@example.com", "key")
        );
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let cfg = CloudflareConfig {
            api_token: Some("  ".to_string()),
            ..config()
        };
        let err = cfg.credential().unwrap_err();
        assert!(matches!(err, ConfigError::NoCredential));
        assert_eq!(err.to_string(), "no authentication method detected");
    }

    #[test]
    fn test_resolve_without_any_source() {
        let err = tokio_test::block_on(config().resolve_credential()).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredential));
    }

    #[test]
    fn test_resolve_prefers_flags() {
        let cfg = CloudflareConfig {
            api_token: Some("tok".to_string()),
            gcp_project: Some("lornu-prod".to_string()),
            ..config()
        };
        let credential = tokio_test::block_on(cfg.resolve_credential());
        tokio_test::assert_ok!(&credential);
        assert_eq!(credential.unwrap(), Credential::token("tok"));
    }

    #[test]
    fn test_zone_id_takes_precedence() {
        let cfg = CloudflareConfig {
            zone_name: Some("example.com".to_string()),
            zone_id: Some("023e105f4ecef8ad9ca31a8372d0c353".to_string()),
            ..config()
        };
        assert_eq!(
            cfg.zone().unwrap(),
            ZoneSelector::Id("023e105f4ecef8ad9ca31a8372d0c353".to_string())
        );
        assert!(matches!(config().zone(), Err(ConfigError::MissingZone)));
    }

    #[test]
    fn test_account_id_required() {
        assert!(matches!(config().account_id(), Err(ConfigError::MissingAccount)));
    }
}
