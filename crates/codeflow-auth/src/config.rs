//! Authorization code flow configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! authorization_code_lifetime = "5m"
//! state_lifetime = "15m"
//! trusted_domains = ["app.example", "*.example.com"]
//!
//! [[supported_scopes]]
//! name = "openid"
//!
//! [[supported_scopes]]
//! name = "profile"
//! description = "Basic profile information"
//!
//! [sealing]
//! key = "base64-or-hex-encoded-256-bit-key"
//!
//! [token_key]
//! namespace = "my-app"
//! salt = "per-deployment-secret"
//! ```

use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::scopes::{ScopeMetadata, StaticScopesProvider};
use crate::seal::{AesGcmSealer, parse_key};
use crate::state::AuthorizationStateFactory;
use crate::token_key::TokenKeyOptions;
use crate::trust::AllowListDomainResolver;

/// Root configuration of the authorization code flow.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CodeFlowConfig {
    /// Pattern the `response_type` parameter must match.
    pub response_type_pattern: String,

    /// How long an issued authorization code stays redeemable.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Maximum age of a sealed state returning from the identity provider.
    #[serde(with = "humantime_serde")]
    pub state_lifetime: Duration,

    /// Upper bound for the length of sealed state and code strings.
    pub max_sealed_length: usize,

    /// Hosts allowed as redirect targets (`host` or `*.suffix`).
    pub trusted_domains: Vec<String>,

    /// Scopes clients may request.
    pub supported_scopes: Vec<ScopeConfig>,

    /// Keys for the bundled sealer.
    pub sealing: SealingConfig,

    /// Token cache key derivation.
    pub token_key: TokenKeyOptions,
}

impl Default for CodeFlowConfig {
    fn default() -> Self {
        Self {
            response_type_pattern: "^code$".to_string(),
            authorization_code_lifetime: Duration::from_secs(600), // 10 minutes
            state_lifetime: Duration::from_secs(900),              // 15 minutes
            max_sealed_length: 4096,
            trusted_domains: Vec::new(),
            supported_scopes: ["openid", "profile", "email", "offline_access"]
                .into_iter()
                .map(ScopeConfig::named)
                .collect(),
            sealing: SealingConfig::default(),
            token_key: TokenKeyOptions::default(),
        }
    }
}

/// A supported scope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScopeConfig {
    /// Scope name as requested by clients.
    pub name: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ScopeConfig {
    /// Creates a scope without description.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
        }
    }
}

/// Sealing key material, hex or base64 encoded.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SealingConfig {
    /// Key used to seal new tokens.
    pub key: Option<String>,

    /// Previous keys still accepted when opening tokens.
    pub retired_keys: Vec<String>,
}

impl fmt::Debug for SealingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealingConfig")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("retired_keys", &self.retired_keys.len())
            .finish()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl CodeFlowConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document is not valid TOML or does
    /// not match the configuration schema.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        toml::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The response type pattern is empty or does not compile
    /// - A lifetime or the sealed length bound is zero
    /// - A trusted domain is not a valid host or wildcard
    /// - No scopes are configured, or a scope name is blank
    /// - The token key namespace or anonymous identifier is blank
    ///
    /// Returns `ConfigError::Missing` if the token key salt is not set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_type_pattern.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "response_type_pattern cannot be empty".to_string(),
            ));
        }
        self.response_type_regex()?;

        if self.authorization_code_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "authorization_code_lifetime must be > 0".to_string(),
            ));
        }
        if self.state_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "state_lifetime must be > 0".to_string(),
            ));
        }
        if self.max_sealed_length == 0 {
            return Err(ConfigError::InvalidValue(
                "max_sealed_length must be > 0".to_string(),
            ));
        }

        for domain in &self.trusted_domains {
            let host = domain.trim();
            let host = host.strip_prefix("*.").unwrap_or(host);
            if host.is_empty() || host.contains('*') || url::Host::parse(host).is_err() {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid trusted domain: '{domain}'"
                )));
            }
        }

        if self.supported_scopes.is_empty() {
            return Err(ConfigError::InvalidValue(
                "supported_scopes cannot be empty".to_string(),
            ));
        }
        if let Some(scope) = self
            .supported_scopes
            .iter()
            .find(|s| s.name.trim().is_empty() || s.name.contains(' '))
        {
            return Err(ConfigError::InvalidValue(format!(
                "Invalid scope name: '{}'",
                scope.name
            )));
        }

        if self.token_key.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "token_key.namespace cannot be empty".to_string(),
            ));
        }
        if self.token_key.anonymous_user_identifier.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "token_key.anonymous_user_identifier cannot be empty".to_string(),
            ));
        }
        if self.token_key.salt.trim().is_empty() {
            return Err(ConfigError::Missing("token_key.salt".to_string()));
        }

        Ok(())
    }

    /// Compiles the response type pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the pattern does not compile.
    pub fn response_type_regex(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.response_type_pattern).map_err(|e| {
            ConfigError::InvalidValue(format!("Invalid response_type_pattern: {e}"))
        })
    }

    /// Builds the redirect allow-list.
    #[must_use]
    pub fn trusted_domain_resolver(&self) -> AllowListDomainResolver {
        AllowListDomainResolver::new(&self.trusted_domains)
    }

    /// Builds the supported scope registry.
    #[must_use]
    pub fn supported_scopes_provider(&self) -> StaticScopesProvider {
        StaticScopesProvider::new(self.supported_scopes.iter().map(|scope| {
            (
                scope.name.clone(),
                ScopeMetadata {
                    description: scope.description.clone(),
                },
            )
        }))
    }

    /// Builds the state factory.
    #[must_use]
    pub fn state_factory(&self) -> AuthorizationStateFactory {
        AuthorizationStateFactory::new(self.state_lifetime)
    }

    /// Builds the bundled AES-256-GCM sealer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no key is configured, or
    /// `ConfigError::InvalidValue` if a key does not decode.
    pub fn sealer(&self) -> Result<AesGcmSealer, ConfigError> {
        let key = self
            .sealing
            .key
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("sealing.key".to_string()))?;
        let key = parse_key(key).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let mut sealer = AesGcmSealer::new(&key);
        for retired in &self.sealing.retired_keys {
            let retired =
                parse_key(retired).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
            sealer = sealer.with_retired_key(&retired);
        }
        Ok(sealer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scopes::SupportedScopesProvider;
    use crate::seal::Sealer;
    use crate::trust::TrustedDomainResolver;

    fn valid_config() -> CodeFlowConfig {
        let mut config = CodeFlowConfig::default();
        config.token_key.salt = "pepper".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = CodeFlowConfig::default();
        assert_eq!(config.response_type_pattern, "^code$");
        assert_eq!(config.authorization_code_lifetime, Duration::from_secs(600));
        assert_eq!(config.state_lifetime, Duration::from_secs(900));
        assert_eq!(config.supported_scopes.len(), 4);
    }

    #[test]
    fn test_default_config_requires_salt() {
        let err = CodeFlowConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(err.to_string().contains("token_key.salt"));

        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let key = hex::encode([9u8; 32]);
        let document = format!(
            r#"
            authorization_code_lifetime = "5m"
            trusted_domains = ["app.example", "*.example.com"]

            [[supported_scopes]]
            name = "openid"

            [[supported_scopes]]
            name = "profile"
            description = "Basic profile"

            [sealing]
            key = "{key}"

            [token_key]
            namespace = "my-app"
            salt = "pepper"
            "#
        );

        let config = CodeFlowConfig::from_toml_str(&document).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.authorization_code_lifetime, Duration::from_secs(300));
        assert_eq!(config.state_lifetime, Duration::from_secs(900));
        assert_eq!(config.token_key.anonymous_user_identifier, "anonymous");

        let scopes = config.supported_scopes_provider().supported_scopes();
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes["profile"].description.as_deref(), Some("Basic profile"));

        let resolver = config.trusted_domain_resolver();
        let url = url::Url::parse("https://api.example.com/cb").unwrap();
        assert!(resolver.is_trusted_domain(&url));

        let sealer = config.sealer().unwrap();
        let sealed = sealer.seal(b"x").unwrap();
        assert_eq!(sealer.open(&sealed).unwrap(), b"x");
    }

    #[test]
    fn test_from_toml_rejects_bad_duration() {
        let err = CodeFlowConfig::from_toml_str(r#"state_lifetime = "soon""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = valid_config();
        config.response_type_pattern = "(".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = valid_config();
        config.state_lifetime = Duration::ZERO;
        assert!(config.validate().unwrap_err().to_string().contains("state_lifetime"));

        let mut config = valid_config();
        config.trusted_domains = vec!["bad host".to_string()];
        assert!(config.validate().unwrap_err().to_string().contains("bad host"));

        let mut config = valid_config();
        config.supported_scopes.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.token_key.namespace = " ".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("namespace"));
    }

    #[test]
    fn test_sealer_requires_key() {
        let config = valid_config();
        assert!(matches!(config.sealer(), Err(ConfigError::Missing(_))));

        let mut config = valid_config();
        config.sealing.key = Some("short".to_string());
        assert!(matches!(config.sealer(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_sealer_accepts_retired_keys() {
        let old_key = hex::encode([1u8; 32]);
        let mut config = valid_config();
        config.sealing.key = Some(old_key.clone());
        let sealed = config.sealer().unwrap().seal(b"before rotation").unwrap();

        config.sealing.key = Some(hex::encode([2u8; 32]));
        config.sealing.retired_keys = vec![old_key];
        assert_eq!(
            config.sealer().unwrap().open(&sealed).unwrap(),
            b"before rotation"
        );
    }

    #[test]
    fn test_sealing_debug_redacts_keys() {
        let mut config = valid_config();
        config.sealing.key = Some("super-secret-key".to_string());
        assert!(!format!("{config:?}").contains("super-secret-key"));
    }
}
