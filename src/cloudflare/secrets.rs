//! API token from Google Secret Manager
//!
//! Used only when no token or key pair is passed on the command line.
//! Authenticates with Application Default Credentials.

use anyhow::{bail, Context, Result};
use gcloud_sdk::google::cloud::secretmanager::v1::secret_manager_service_client::SecretManagerServiceClient;
use gcloud_sdk::google::cloud::secretmanager::v1::AccessSecretVersionRequest;
use gcloud_sdk::{GoogleApi, GoogleAuthMiddleware};
use tracing::debug;

const SECRET_MANAGER_API: &str = "https://secretmanager.googleapis.com";

/// Reads the token secret of one GCP project
pub struct SecretManagerTokenSource {
    client: GoogleApi<SecretManagerServiceClient<GoogleAuthMiddleware>>,
    project_id: String,
}

impl SecretManagerTokenSource {
    pub async fn connect(project_id: &str) -> Result<Self> {
        debug!(project = project_id, "Connecting to Secret Manager");
        let client = GoogleApi::from_function(SecretManagerServiceClient::new, SECRET_MANAGER_API, None)
            .await
            .context("Failed to initialize Secret Manager client")?;
        Ok(Self {
            client,
            project_id: project_id.to_string(),
        })
    }

    /// Latest version of `secret`, which must hold a non-blank token.
    pub async fn fetch_token(&self, secret: &str) -> Result<String> {
        let name = latest_version(&self.project_id, secret);
        debug!(secret = %name, "Reading API token");

        let payload = self
            .client
            .get()
            .access_secret_version(AccessSecretVersionRequest { name: name.clone() })
            .await
            .with_context(|| format!("Failed to access {}", name))?
            .into_inner()
            .payload
            .with_context(|| format!("{} has no payload", name))?;

        token_from_payload(payload.data.as_sensitive_str(), secret)
    }
}

fn latest_version(project_id: &str, secret: &str) -> String {
    format!("projects/{}/secrets/{}/versions/latest", project_id, secret)
}

fn token_from_payload(payload: &str, secret: &str) -> Result<String> {
    let token = payload.trim();
    if token.is_empty() {
        bail!("secret {} is empty", secret);
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_version_name() {
        assert_eq!(
            latest_version("ops-project", "cloudflare-api-token"),
            "projects/ops-project/secrets/cloudflare-api-token/versions/latest"
        );
    }

    #[test]
    fn test_token_is_trimmed() {
        assert_eq!(token_from_payload("  tok\n", "s").unwrap(), "tok");
    }

    #[test]
    fn test_blank_secret_is_rejected() {
        let err = token_from_payload(" \n", "cloudflare-api-token").unwrap_err();
        assert_eq!(err.to_string(), "secret cloudflare-api-token is empty");
    }
}
