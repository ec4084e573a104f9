//! Capability Gate
//!
//! Checks a credential's policies for a required permission group before any
//! destructive call is made. The check is advisory; the remote API remains the
//! authority and can still reject individual calls.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::error::{ApiError, BulkError};
use crate::cloudflare::credentials::Credential;
use crate::cloudflare::permissions::Capability;

const ACTIVE: &str = "active";

/// Result of verifying the credential against the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub id: String,
    pub status: String,
}

/// One policy of a token, reduced to the permission groups it grants
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenPolicy {
    pub id: String,
    pub permission_groups: Vec<String>,
}

/// Remote introspection of the calling credential
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    async fn verify_token(&self) -> Result<TokenStatus, ApiError>;

    async fn token_policies(&self, token_id: &str) -> Result<Vec<TokenPolicy>, ApiError>;
}

/// How a passing check was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// A policy grants one of the required capabilities
    Granted,
    /// The credential kind has no policies to inspect
    NotIntrospectable,
    /// The token may not read its own policies; the check was skipped
    Unverifiable,
}

pub struct CapabilityGate<'a> {
    credential: &'a Credential,
    introspector: &'a dyn TokenIntrospector,
}

impl<'a> CapabilityGate<'a> {
    pub fn new(credential: &'a Credential, introspector: &'a dyn TokenIntrospector) -> Self {
        Self {
            credential,
            introspector,
        }
    }

    /// Pass if any policy grants any one of `required`.
    pub async fn check(&self, required: &[Capability]) -> Result<GateOutcome, BulkError> {
        if !self.credential.is_introspectable() {
            debug!("No API token set, skipping permission check");
            return Ok(GateOutcome::NotIntrospectable);
        }
        debug!(required = ?required, "Checking API token permission");

        let token = match self.introspector.verify_token().await {
            Ok(token) => token,
            Err(e) if e.is_self_introspection_denied() => return Ok(unverifiable()),
            Err(e) => return Err(e.into()),
        };
        if token.status != ACTIVE {
            return Err(BulkError::CredentialInactive {
                status: token.status,
            });
        }

        let policies = match self.introspector.token_policies(&token.id).await {
            Ok(policies) => policies,
            Err(e) if e.is_self_introspection_denied() => return Ok(unverifiable()),
            Err(e) => return Err(e.into()),
        };
        debug!(policies = policies.len(), "Fetched token policies");

        let wanted: Vec<&str> = required.iter().map(|c| c.permission_group_id()).collect();
        let granted = policies.iter().any(|policy| {
            policy
                .permission_groups
                .iter()
                .any(|group| wanted.contains(&group.as_str()))
        });

        if granted {
            Ok(GateOutcome::Granted)
        } else {
            Err(BulkError::InsufficientCapability {
                required: required.to_vec(),
            })
        }
    }
}

fn unverifiable() -> GateOutcome {
    warn!("API token is not authorized to read its own permissions, continuing without the check");
    GateOutcome::Unverifiable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudflare::permissions::permission_groups;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubIntrospector {
        status: &'static str,
        groups: Vec<&'static str>,
        verify_error: Option<ApiError>,
        policies_error: Option<ApiError>,
        calls: AtomicUsize,
    }

    impl StubIntrospector {
        fn granting(groups: Vec<&'static str>) -> Self {
            Self {
                status: "active",
                groups,
                verify_error: None,
                policies_error: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenIntrospector for StubIntrospector {
        async fn verify_token(&self) -> Result<TokenStatus, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = &self.verify_error {
                return Err(e.clone());
            }
            Ok(TokenStatus {
                id: "token-1".to_string(),
                status: self.status.to_string(),
            })
        }

        async fn token_policies(&self, token_id: &str) -> Result<Vec<TokenPolicy>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(token_id, "token-1");
            if let Some(e) = &self.policies_error {
                return Err(e.clone());
            }
            Ok(vec![
                TokenPolicy {
                    id: "policy-read".to_string(),
                    permission_groups: vec!["c8fed203ed3043cba015a93ad1616f1f".to_string()],
                },
                TokenPolicy {
                    id: "policy-write".to_string(),
                    permission_groups: self.groups.iter().map(|g| g.to_string()).collect(),
                },
            ])
        }
    }

    #[tokio::test]
    async fn test_matching_permission_group_passes() {
        let credential = Credential::token("t");
        let stub = StubIntrospector::granting(vec![permission_groups::PAGES_WRITE]);

        let outcome = CapabilityGate::new(&credential, &stub)
            .check(&[Capability::PagesWrite])
            .await
            .unwrap();

        assert_eq!(outcome, GateOutcome::Granted);
    }

    #[tokio::test]
    async fn test_any_one_required_capability_is_enough() {
        let credential = Credential::token("t");
        let stub = StubIntrospector::granting(vec![permission_groups::TUNNEL_WRITE]);

        let outcome = CapabilityGate::new(&credential, &stub)
            .check(&[Capability::TunnelRead, Capability::TunnelWrite])
            .await
            .unwrap();

        assert_eq!(outcome, GateOutcome::Granted);
    }

    #[tokio::test]
    async fn test_missing_permission_names_the_capability() {
        let credential = Credential::token("t");
        let stub = StubIntrospector::granting(vec![permission_groups::DNS_WRITE]);

        let err = CapabilityGate::new(&credential, &stub)
            .check(&[Capability::PagesWrite])
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::InsufficientCapability { .. }));
        assert!(err.to_string().contains("Pages:Edit"));
    }

    #[tokio::test]
    async fn test_legacy_credential_skips_introspection() {
        let credential = Credential::key_pair("ops@example.com", "key");
        let stub = StubIntrospector::granting(vec![]);

        let outcome = CapabilityGate::new(&credential, &stub)
            .check(&[Capability::DnsWrite])
            .await
            .unwrap();

        assert_eq!(outcome, GateOutcome::NotIntrospectable);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_self_introspection_denied_degrades_to_pass() {
        let credential = Credential::token("t");
        let mut stub = StubIntrospector::granting(vec![]);
        stub.policies_error = Some(ApiError::remote(
            403,
            9109,
            "Unauthorized to access requested resource",
        ));

        let outcome = CapabilityGate::new(&credential, &stub)
            .check(&[Capability::DnsWrite])
            .await
            .unwrap();

        assert_eq!(outcome, GateOutcome::Unverifiable);
    }

    #[tokio::test]
    async fn test_verify_denied_degrades_to_pass_without_policy_lookup() {
        let credential = Credential::token("t");
        let mut stub = StubIntrospector::granting(vec![]);
        stub.verify_error = Some(ApiError::remote(
            403,
            9109,
            "Unauthorized to access requested resource",
        ));

        let outcome = CapabilityGate::new(&credential, &stub)
            .check(&[Capability::PagesWrite])
            .await
            .unwrap();

        assert_eq!(outcome, GateOutcome::Unverifiable);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_introspection_errors_are_surfaced() {
        let credential = Credential::token("t");
        let mut stub = StubIntrospector::granting(vec![]);
        stub.policies_error = Some(ApiError::Transport("connection refused".to_string()));

        let err = CapabilityGate::new(&credential, &stub)
            .check(&[Capability::DnsWrite])
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::Api(ApiError::Transport(_))));
    }

    #[tokio::test]
    async fn test_inactive_token_fails() {
        let credential = Credential::token("t");
        let mut stub = StubIntrospector::granting(vec![permission_groups::DNS_WRITE]);
        stub.status = "disabled";

        let err = CapabilityGate::new(&credential, &stub)
            .check(&[Capability::DnsWrite])
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::CredentialInactive { ref status } if status == "disabled"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }
}
