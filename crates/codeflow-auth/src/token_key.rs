//! Deterministic per-principal token cache keys.
//!
//! A [`TokenKeyProvider`] turns a principal into an ordered list of
//! components and hands it to a [`TokenKeyGenerator`], which derives the
//! opaque key. Raw claim values never leave the generator.
//!
//! Component order is fixed:
//!
//! | Principal | Components |
//! |-----------|------------|
//! | anonymous or absent | `namespace, token_type, anonymous_user_identifier, salt` |
//! | authenticated | `namespace, token_type, sub, [name], [email], salt` |
//!
//! `name` and `email` are included only when present and non-blank.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::AuthResult;
use crate::error::AuthError;
use crate::principal::{ClaimsPrincipal, claim_types};

/// Settings shared by every key a provider derives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenKeyOptions {
    /// Prefix separating this deployment's keys from others.
    pub namespace: String,

    /// Stand-in subject for unauthenticated principals.
    pub anonymous_user_identifier: String,

    /// Secret mixed into every key. Must be set per deployment.
    pub salt: String,
}

impl Default for TokenKeyOptions {
    fn default() -> Self {
        Self {
            namespace: "codeflow".to_string(),
            anonymous_user_identifier: "anonymous".to_string(),
            salt: String::new(),
        }
    }
}

/// Source of the current [`TokenKeyOptions`].
pub trait TokenKeyOptionsSource: Send + Sync {
    /// Returns the options in effect.
    fn token_key_options(&self) -> TokenKeyOptions;
}

impl TokenKeyOptionsSource for TokenKeyOptions {
    fn token_key_options(&self) -> TokenKeyOptions {
        self.clone()
    }
}

/// Derives an opaque key from ordered components.
#[async_trait]
pub trait TokenKeyGenerator: Send + Sync {
    /// Derives the key for `components`.
    ///
    /// Must be a pure function of the ordered components.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Cancelled`] if `cancellation` fires first, or an
    /// error if derivation fails.
    async fn generate(
        &self,
        components: &[String],
        cancellation: &CancellationToken,
    ) -> AuthResult<String>;
}

/// SHA-256 over length-prefixed components, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256TokenKeyGenerator;

#[async_trait]
impl TokenKeyGenerator for Sha256TokenKeyGenerator {
    async fn generate(
        &self,
        components: &[String],
        cancellation: &CancellationToken,
    ) -> AuthResult<String> {
        if cancellation.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        let mut hasher = Sha256::new();
        for component in components {
            // Length prefix keeps ["ab", "c"] and ["a", "bc"] apart.
            hasher.update((component.len() as u64).to_be_bytes());
            hasher.update(component.as_bytes());
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Resolves the cache key for a principal.
#[derive(Clone)]
pub struct TokenKeyProvider {
    token_type: String,
    options: Arc<dyn TokenKeyOptionsSource>,
    generator: Arc<dyn TokenKeyGenerator>,
}

impl TokenKeyProvider {
    /// Creates a provider for keys of `token_type`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidArgument`] if `token_type` is blank.
    pub fn new(
        token_type: impl Into<String>,
        options: Arc<dyn TokenKeyOptionsSource>,
        generator: Arc<dyn TokenKeyGenerator>,
    ) -> AuthResult<Self> {
        let token_type = token_type.into();
        if token_type.trim().is_empty() {
            return Err(AuthError::invalid_argument("token_type"));
        }
        Ok(Self {
            token_type,
            options,
            generator,
        })
    }

    /// The token type this provider derives keys for.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Derives the key for `principal`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Configuration`] if the options carry a blank salt
    /// - [`AuthError::Security`] if an authenticated principal has no
    ///   name identifier claim
    /// - [`AuthError::Cancelled`] if `cancellation` fires first
    /// - any error raised by the generator
    pub async fn resolve(
        &self,
        principal: Option<&ClaimsPrincipal>,
        cancellation: &CancellationToken,
    ) -> AuthResult<String> {
        let options = self.options.token_key_options();
        if options.salt.trim().is_empty() {
            tracing::error!(token_type = %self.token_type, "token key salt is not configured");
            return Err(AuthError::configuration("token key salt is not configured"));
        }
        let components = self.components(principal, options)?;

        tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                tracing::debug!(token_type = %self.token_type, "token key resolution cancelled");
                Err(AuthError::Cancelled)
            }
            key = self.generator.generate(&components, cancellation) => key,
        }
    }

    fn components(
        &self,
        principal: Option<&ClaimsPrincipal>,
        options: TokenKeyOptions,
    ) -> AuthResult<Vec<String>> {
        let mut components = vec![options.namespace, self.token_type.clone()];

        match principal.filter(|p| p.is_authenticated()) {
            None => components.push(options.anonymous_user_identifier),
            Some(principal) => {
                let Some(subject) = non_blank_claim(principal, claim_types::NAME_IDENTIFIER)
                else {
                    tracing::warn!(
                        token_type = %self.token_type,
                        "authenticated principal has no name identifier claim"
                    );
                    return Err(AuthError::security(
                        "unable to generate a token key for the authenticated user",
                    ));
                };
                components.push(subject.to_string());
                components.extend(
                    [claim_types::NAME, claim_types::EMAIL]
                        .into_iter()
                        .filter_map(|claim| non_blank_claim(principal, claim))
                        .map(str::to_string),
                );
            }
        }

        components.push(options.salt);
        Ok(components)
    }
}

fn non_blank_claim<'p>(principal: &'p ClaimsPrincipal, claim_type: &str) -> Option<&'p str> {
    principal
        .find_first(claim_type)
        .filter(|value| !value.trim().is_empty())
}
