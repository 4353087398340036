//! Supported scope registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// Descriptive metadata for a scope the issuer recognizes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeMetadata {
    /// Human-readable description shown on consent screens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ScopeMetadata {
    /// Creates metadata with a description.
    #[must_use]
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
        }
    }
}

/// Source of the scopes a client may request.
pub trait SupportedScopesProvider: Send + Sync {
    /// Returns a snapshot of the supported scopes keyed by name.
    fn supported_scopes(&self) -> Arc<BTreeMap<String, ScopeMetadata>>;
}

/// Scope registry with runtime replacement.
#[derive(Debug, Default)]
pub struct StaticScopesProvider {
    scopes: ArcSwap<BTreeMap<String, ScopeMetadata>>,
}

impl StaticScopesProvider {
    /// Creates a provider from `(name, metadata)` pairs.
    pub fn new<I>(scopes: I) -> Self
    where
        I: IntoIterator<Item = (String, ScopeMetadata)>,
    {
        Self {
            scopes: ArcSwap::from_pointee(scopes.into_iter().collect()),
        }
    }

    /// Creates a provider from bare scope names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| (name.into(), ScopeMetadata::default())),
        )
    }

    /// Replaces the registry.
    pub fn replace<I>(&self, scopes: I)
    where
        I: IntoIterator<Item = (String, ScopeMetadata)>,
    {
        self.scopes.store(Arc::new(scopes.into_iter().collect()));
    }
}

impl SupportedScopesProvider for StaticScopesProvider {
    fn supported_scopes(&self) -> Arc<BTreeMap<String, ScopeMetadata>> {
        self.scopes.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_survives_replace() {
        let provider = StaticScopesProvider::from_names(["openid", "profile"]);
        let before = provider.supported_scopes();

        provider.replace([("email".to_string(), ScopeMetadata::described("E-mail"))]);
        let after = provider.supported_scopes();

        assert_eq!(before.len(), 2);
        assert!(before.contains_key("profile"));
        assert_eq!(after.len(), 1);
        assert_eq!(
            after["email"].description.as_deref(),
            Some("E-mail")
        );
    }
}
