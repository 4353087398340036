//! OAuth 2.0 authorization code flow.
//!
//! The flow is split into three commands, each validated before it acts:
//!
//! - [`prepare`] - turns an authorization request into a sealed state
//! - [`generate`] - binds the authenticated identity on return from the
//!   identity provider
//! - [`authenticate`] - matches a code exchange against the bound data
//!
//! [`flow`] wires them to their collaborators; [`authorize`] and [`token`]
//! hold the endpoint wire types.
//!
//! # Example
//!
//! ```ignore
//! use codeflow_auth::oauth::{AuthorizationCodeFlow, AuthorizationRequest};
//!
//! let flow = AuthorizationCodeFlow::from_config(&config, repository, consumption)?;
//! let prepared = flow.prepare(&request.into_command(sealer), &cancel).await?;
//! ```

pub mod authenticate;
pub mod authorize;
pub mod context;
pub mod flow;
pub mod generate;
pub mod prepare;
pub mod token;

// Commands
pub use authenticate::AuthenticateAuthorizationCodeCommand;
pub use generate::{BoundAuthorization, GenerateAuthorizationCodeCommand};
pub use prepare::PrepareAuthorizationCodeFlowCommand;

// Orchestration
pub use context::{DEFAULT_MAX_SEALED_LENGTH, FlowContext};
pub use flow::{
    AuthorizationCodeFlow, DEFAULT_CODE_LIFETIME, GeneratedAuthorizationCode,
    PreparedAuthorization,
};

// Authorization endpoint types
pub use authorize::{
    AuthorizationError, AuthorizationErrorCode, AuthorizationRequest, AuthorizationResponse,
};

// Token endpoint types
pub use token::{AUTHORIZATION_CODE_GRANT, TokenError, TokenErrorCode, TokenRequest, parse_basic_auth};
