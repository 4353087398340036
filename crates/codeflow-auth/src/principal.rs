//! Authenticated principal and claims.
//!
//! A [`ClaimsPrincipal`] wraps at most one [`ClaimsIdentity`]. An identity is
//! authenticated when it carries an authentication type (the scheme that
//! authenticated it, e.g. `"oidc"`).

use serde::{Deserialize, Serialize};

/// Well-known claim types.
pub mod claim_types {
    /// Stable, unique identifier of the subject.
    pub const NAME_IDENTIFIER: &str = "sub";
    /// Display name of the subject.
    pub const NAME: &str = "name";
    /// E-mail address of the subject.
    pub const EMAIL: &str = "email";
}

/// A single claim about a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type, e.g. `sub` or `email`.
    #[serde(rename = "type")]
    pub claim_type: String,
    /// Claim value.
    pub value: String,
}

impl Claim {
    /// Creates a new claim.
    #[must_use]
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// A set of claims produced by one authentication scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsIdentity {
    /// Scheme that authenticated this identity. `None` for anonymous identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_type: Option<String>,
    /// Claims in issue order.
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl ClaimsIdentity {
    /// Creates an authenticated identity.
    #[must_use]
    pub fn authenticated(authentication_type: impl Into<String>, claims: Vec<Claim>) -> Self {
        Self {
            authentication_type: Some(authentication_type.into()),
            claims,
        }
    }

    /// Creates an anonymous identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Returns `true` if the identity carries a non-blank authentication type.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authentication_type
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// Returns the value of the first claim of `claim_type`.
    #[must_use]
    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }
}

/// The subject of a request, wrapping its identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsPrincipal {
    /// The primary identity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ClaimsIdentity>,
}

impl ClaimsPrincipal {
    /// Creates a principal from an identity.
    #[must_use]
    pub fn new(identity: ClaimsIdentity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    /// Creates a principal without any identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Returns `true` if the principal has an authenticated identity.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity
            .as_ref()
            .is_some_and(ClaimsIdentity::is_authenticated)
    }

    /// Returns the authentication type of the identity.
    #[must_use]
    pub fn authentication_type(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .and_then(|i| i.authentication_type.as_deref())
    }

    /// Returns the value of the first claim of `claim_type`.
    #[must_use]
    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.identity.as_ref().and_then(|i| i.find_first(claim_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_identity() {
        let principal = ClaimsPrincipal::new(ClaimsIdentity::authenticated(
            "oidc",
            vec![Claim::new(claim_types::NAME_IDENTIFIER, "user-1")],
        ));

        assert!(principal.is_authenticated());
        assert_eq!(principal.authentication_type(), Some("oidc"));
        assert_eq!(
            principal.find_first(claim_types::NAME_IDENTIFIER),
            Some("user-1")
        );
        assert_eq!(principal.find_first(claim_types::EMAIL), None);
    }

    #[test]
    fn test_blank_authentication_type_is_anonymous() {
        let identity = ClaimsIdentity::authenticated("  ", vec![]);
        assert!(!identity.is_authenticated());
        assert!(!ClaimsPrincipal::anonymous().is_authenticated());
        assert!(!ClaimsPrincipal::new(ClaimsIdentity::anonymous()).is_authenticated());
    }

    #[test]
    fn test_principal_deserialize() {
        let json = r#"{
            "identity": {
                "authenticationType": "oidc",
                "claims": [
                    {"type": "sub", "value": "user-1"},
                    {"type": "email", "value": "user@example.com"}
                ]
            }
        }"#;

        let principal: ClaimsPrincipal = serde_json::from_str(json).unwrap();
        assert!(principal.is_authenticated());
        assert_eq!(
            principal.find_first(claim_types::EMAIL),
            Some("user@example.com")
        );
    }
}
