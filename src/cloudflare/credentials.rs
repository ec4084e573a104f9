//! API credentials
//!
//! Two authentication schemes exist: a scoped API token, which can be
//! introspected for its policies, and the legacy email + global API key pair,
//! which cannot.

/// Credential used for every request of one invocation
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `Authorization: Bearer <token>`
    ScopedToken(String),
    /// `X-Auth-Email` + `X-Auth-Key`
    LegacyKeyPair { email: String, key: String },
}

impl Credential {
    pub fn token(token: impl Into<String>) -> Self {
        Credential::ScopedToken(token.into())
    }

    pub fn key_pair(email: impl Into<String>, key: impl Into<String>) -> Self {
        Credential::LegacyKeyPair {
            email: email.into(),
            key: key.into(),
        }
    }

    /// Whether the remote can report this credential's policies.
    pub fn is_introspectable(&self) -> bool {
        matches!(self, Credential::ScopedToken(_))
    }
}

// Secrets never reach logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ScopedToken(_) => f.debug_tuple("ScopedToken").field(&"***").finish(),
            Credential::LegacyKeyPair { email, .. } => f
                .debug_struct("LegacyKeyPair")
                .field("email", email)
                .field("key", &"***")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let token = Credential::token("super-secret-token");
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("super-secret-token"));

        let pair = Credential::key_pair("ops@example.com", "global-key");
        let rendered = format!("{:?}", pair);
        assert!(rendered.contains("ops@example.com"));
        assert!(!rendered.contains("global-key"));
    }

    #[test]
    fn test_only_tokens_are_introspectable() {
        assert!(Credential::token("t").is_introspectable());
        assert!(!Credential::key_pair("a@b.c", "k").is_introspectable());
    }
}
