//! # codeflow-auth
//!
//! OAuth 2.0 authorization code flow engine.
//!
//! This crate provides:
//! - Validation of authorization requests against live client, redirect
//!   trust and scope data
//! - Tamper-evident sealed state for the identity provider round trip
//! - Sealed authorization codes bound to an authenticated identity
//! - Code exchange matching with single-use consumption
//! - Deterministic per-principal token cache keys
//!
//! ## Overview
//!
//! State and codes are opaque strings produced by an injected [`Sealer`].
//! Nothing about an in-flight authorization is stored server-side until
//! the code is redeemed, at which point its identifier is recorded so it
//! cannot be redeemed twice.
//!
//! ## Modules
//!
//! - [`config`] - Flow configuration
//! - [`oauth`] - The three flow commands, orchestration and endpoint types
//! - [`state`] - Authorization state, its factory and the sealed framing
//! - [`validation`] - Result-accumulating validator and the flow rules
//! - [`seal`] - Sealing capability and the AES-GCM adapter
//! - [`storage`] - Client registry and code consumption traits
//! - [`trust`] - Redirect domain allow-list
//! - [`scopes`] - Supported scope registry
//! - [`principal`] - Claims-based identities
//! - [`token_key`] - Token cache key derivation

pub mod config;
pub mod error;
pub mod oauth;
pub mod principal;
pub mod scopes;
pub mod seal;
pub mod state;
pub mod storage;
pub mod token_key;
pub mod trust;
pub mod validation;

pub use config::{CodeFlowConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use oauth::{
    AuthenticateAuthorizationCodeCommand, AuthorizationCodeFlow, FlowContext,
    GenerateAuthorizationCodeCommand, PrepareAuthorizationCodeFlowCommand,
};
pub use principal::{Claim, ClaimsIdentity, ClaimsPrincipal};
pub use seal::{AesGcmSealer, SealError, Sealer};
pub use state::{
    AuthorizationData, AuthorizationState, AuthorizationStateFactory, IssuedCode, RedeemedCode,
};
pub use storage::{
    ClientSecretIdentity, CodeConsumptionStore, InMemoryCodeConsumptionStore,
    InMemorySecurityRepository, SecurityRepository,
};
pub use token_key::{Sha256TokenKeyGenerator, TokenKeyGenerator, TokenKeyOptions, TokenKeyProvider};
pub use trust::{AllowListDomainResolver, TrustedDomainResolver};
pub use scopes::{ScopeMetadata, StaticScopesProvider, SupportedScopesProvider};
pub use validation::{FailureCode, ValidationErrors, ValidationFailure, Validator};

/// Type alias for authorization code flow results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use codeflow_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{CodeFlowConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::oauth::{
        AuthenticateAuthorizationCodeCommand, AuthorizationCodeFlow, AuthorizationError,
        AuthorizationRequest, AuthorizationResponse, FlowContext,
        GenerateAuthorizationCodeCommand, PrepareAuthorizationCodeFlowCommand, TokenError,
        TokenRequest,
    };
    pub use crate::principal::{Claim, ClaimsIdentity, ClaimsPrincipal, claim_types};
    pub use crate::seal::{AesGcmSealer, Sealer};
    pub use crate::storage::{
        ClientSecretIdentity, CodeConsumptionStore, InMemoryCodeConsumptionStore,
        InMemorySecurityRepository, SecurityRepository,
    };
    pub use crate::token_key::{TokenKeyOptionsSource, TokenKeyProvider};
    pub use crate::trust::{AllowListDomainResolver, TrustedDomainResolver};
    pub use crate::scopes::{StaticScopesProvider, SupportedScopesProvider};
}
