//! Identity verification for owner-scoped endpoints.

use std::collections::HashMap;

use crate::config::AuthConfig;
use crate::error::{DeepGynError, Result};

/// Opaque identity oracle: maps a credential to a verified owner email.
pub trait IdentityOracle: Send + Sync {
    /// The verified email behind `token`, if any.
    fn verify(&self, token: &str) -> Option<String>;

    /// Whether requests are trusted without credentials.
    fn is_open(&self) -> bool;
}

/// Static bearer-token table.
///
/// If no tokens are configured, all requests are accepted (open mode) and the
/// owner named in the request is trusted.
#[derive(Debug, Clone, Default)]
pub struct TokenIdentity {
    tokens: HashMap<String, String>,
}

impl TokenIdentity {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.tokens.clone())
    }
}

impl IdentityOracle for TokenIdentity {
    fn verify(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }

    fn is_open(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Strip the `Bearer ` scheme from an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Decide which owner a request may act as.
///
/// In open mode the requested owner is used as-is. Otherwise the token must
/// verify, and the verified email must match the requested owner when one is
/// given.
pub fn resolve_owner(
    oracle: &dyn IdentityOracle,
    token: Option<&str>,
    requested: Option<&str>,
) -> Result<String> {
    let requested = requested.map(str::trim).filter(|o| !o.is_empty());
    if oracle.is_open() {
        return requested
            .map(str::to_string)
            .ok_or_else(|| DeepGynError::invalid_input("owner is required"));
    }
    let verified = token
        .and_then(|t| oracle.verify(t))
        .ok_or(DeepGynError::Unauthorized)?;
    match requested {
        Some(owner) if owner != verified => Err(DeepGynError::Forbidden {
            owner: owner.to_string(),
        }),
        _ => Ok(verified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> TokenIdentity {
        TokenIdentity::new(
            [("tok-x".to_string(), "dr.x@example.com".to_string())]
                .into_iter()
                .collect(),
        )
    }

    #[test]
    fn test_verify_token() {
        let id = oracle();
        assert_eq!(id.verify("tok-x").as_deref(), Some("dr.x@example.com"));
        assert!(id.verify("wrong").is_none());
        assert!(!id.is_open());
    }

    #[test]
    fn test_open_mode() {
        let id = TokenIdentity::default();
        assert!(id.is_open());
        assert_eq!(
            resolve_owner(&id, None, Some("dr.x@example.com")).unwrap(),
            "dr.x@example.com"
        );
        assert!(matches!(
            resolve_owner(&id, None, Some("  ")),
            Err(DeepGynError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_resolve_requires_token() {
        let id = oracle();
        assert!(matches!(
            resolve_owner(&id, None, Some("dr.x@example.com")),
            Err(DeepGynError::Unauthorized)
        ));
        assert!(matches!(
            resolve_owner(&id, Some("bad"), Some("dr.x@example.com")),
            Err(DeepGynError::Unauthorized)
        ));
    }

    #[test]
    fn test_resolve_owner_mismatch() {
        let id = oracle();
        assert!(matches!(
            resolve_owner(&id, Some("tok-x"), Some("other@example.com")),
            Err(DeepGynError::Forbidden { .. })
        ));
        assert_eq!(
            resolve_owner(&id, Some("tok-x"), None).unwrap(),
            "dr.x@example.com"
        );
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn test_from_config() {
        let config = AuthConfig {
            tokens: [("t".to_string(), "a@b.c".to_string())].into_iter().collect(),
        };
        let id = TokenIdentity::from_config(&config);
        assert_eq!(id.verify("t").as_deref(), Some("a@b.c"));
    }
}
