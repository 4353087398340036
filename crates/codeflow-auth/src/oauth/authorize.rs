//! Authorization endpoint types.
//!
//! This module provides the wire shapes of the OAuth 2.0 authorization
//! endpoint: the inbound query, the success redirect and the error redirect.
//!
//! # Flow
//!
//! 1. The client redirects the user here with an [`AuthorizationRequest`]
//! 2. The request becomes a [`PrepareAuthorizationCodeFlowCommand`] and its
//!    sealed state travels through the identity provider
//! 3. On return, an [`AuthorizationResponse`] redirects back to the client
//!    with the code and the caller's untouched `state`
//!
//! Failures redirect with an [`AuthorizationError`] only when the client
//! and redirect URI themselves were valid; see
//! [`AuthorizationError::can_redirect`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::prepare::PrepareAuthorizationCodeFlowCommand;
use crate::error::AuthError;
use crate::seal::Sealer;
use crate::validation::{FailureCode, ValidationErrors};

/// Authorization request parameters.
///
/// Every parameter is optional on the wire; absent values are reported by
/// command validation.
///
/// # Example
///
/// ```ignore
/// GET /authorize?
///   response_type=code
///   &client_id=client-1
///   &redirect_uri=https://app.example/callback
///   &scope=profile email
///   &state=xyz
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    /// Must be "code".
    #[serde(default)]
    pub response_type: Option<String>,

    /// Client identifier issued during registration.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Where the response is delivered. Its host must be trusted.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Requested scopes (space-separated).
    #[serde(default)]
    pub scope: Option<String>,

    /// Opaque caller state, echoed back unmodified.
    #[serde(default)]
    pub state: Option<String>,

    /// OpenID Connect nonce.
    #[serde(default)]
    pub nonce: Option<String>,
}

impl AuthorizationRequest {
    /// Converts the request into a prepare command.
    #[must_use]
    pub fn into_command(self, sealer: Arc<dyn Sealer>) -> PrepareAuthorizationCodeFlowCommand {
        PrepareAuthorizationCodeFlowCommand {
            response_type: self.response_type,
            client_id: self.client_id,
            redirect_uri: self.redirect_uri,
            scopes: self
                .scope
                .map(|scope| scope.split_whitespace().map(str::to_string).collect()),
            state: self.state,
            nonce: self.nonce,
            sealer: Some(sealer),
        }
    }
}

/// Authorization response parameters.
///
/// # Example
///
/// ```ignore
/// HTTP/1.1 302 Found
/// Location: https://app.example/callback?code=...&state=xyz
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    /// Sealed authorization code to exchange at the token endpoint.
    pub code: String,

    /// The caller's state, present only if the request carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationResponse {
    /// Creates a new authorization response.
    #[must_use]
    pub fn new(code: String, state: Option<String>) -> Self {
        Self { code, state }
    }

    /// Builds the redirect URL with response parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `redirect_uri` is not a valid URL.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("code", &self.code);
            if let Some(ref state) = self.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

/// Authorization error response, delivered by redirect.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationError {
    /// OAuth 2.0 error code.
    pub error: AuthorizationErrorCode,

    /// Human-readable error description (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Echoed caller state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationError {
    /// Creates a new authorization error.
    #[must_use]
    pub fn new(error: AuthorizationErrorCode, state: Option<String>) -> Self {
        Self {
            error,
            error_description: None,
            state,
        }
    }

    /// Creates a new authorization error with description.
    #[must_use]
    pub fn with_description(
        error: AuthorizationErrorCode,
        description: impl Into<String>,
        state: Option<String>,
    ) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            state,
        }
    }

    /// Maps a flow error onto the authorization endpoint's error codes.
    ///
    /// Server-side failures carry no description. Validation failures are
    /// described by field and code only, see
    /// [`ValidationErrors::public_description`].
    #[must_use]
    pub fn from_auth_error(err: &AuthError, state: Option<String>) -> Self {
        let code = AuthorizationErrorCode::from(err);
        match (code, err) {
            (
                AuthorizationErrorCode::ServerError
                | AuthorizationErrorCode::TemporarilyUnavailable,
                _,
            ) => Self::new(code, state),
            (_, AuthError::Validation(errors)) => {
                Self::with_description(code, errors.public_description(), state)
            }
            _ => Self::with_description(code, err.to_string(), state),
        }
    }

    /// Returns `false` when the error concerns the client or redirect URI
    /// themselves, or a sealed state that did not open. Such errors must be
    /// shown to the user instead of redirecting to a location that was not
    /// verified.
    #[must_use]
    pub fn can_redirect(err: &AuthError) -> bool {
        match err {
            AuthError::InvalidClient { .. } => false,
            AuthError::Validation(errors) => {
                !errors.has_state_failure()
                    && !errors
                        .iter()
                        .any(|f| f.field == "client_id" || f.field == "redirect_uri")
            }
            _ => true,
        }
    }

    /// Builds the redirect URL with error parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `redirect_uri` is not a valid URL.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("error", self.error.as_str());
            if let Some(ref desc) = self.error_description {
                pairs.append_pair("error_description", desc);
            }
            if let Some(ref state) = self.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

/// OAuth 2.0 authorization error codes.
///
/// These error codes are defined in RFC 6749 Section 4.1.2.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationErrorCode {
    /// The request is missing a required parameter, includes an invalid
    /// parameter value, or is otherwise malformed.
    InvalidRequest,

    /// The client is not authorized to request an authorization code
    /// using this method.
    UnauthorizedClient,

    /// The resource owner or authorization server denied the request.
    AccessDenied,

    /// The authorization server does not support obtaining an authorization
    /// code using this method.
    UnsupportedResponseType,

    /// The requested scope is invalid, unknown, or malformed.
    InvalidScope,

    /// The authorization server encountered an unexpected condition.
    ServerError,

    /// The authorization server is temporarily unable to handle the request.
    TemporarilyUnavailable,
}

impl AuthorizationErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }

    fn from_validation(errors: &ValidationErrors) -> Self {
        if errors.contains(FailureCode::PatternMismatch, "response_type") {
            Self::UnsupportedResponseType
        } else if errors.iter().any(|f| f.field == "scopes") {
            Self::InvalidScope
        } else {
            Self::InvalidRequest
        }
    }
}

impl From<&AuthError> for AuthorizationErrorCode {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Validation(errors) => Self::from_validation(errors),
            AuthError::InvalidClient { .. } => Self::UnauthorizedClient,
            AuthError::InvalidGrant { .. } => Self::InvalidRequest,
            AuthError::Cancelled | AuthError::Storage { .. } => Self::TemporarilyUnavailable,
            AuthError::InvalidArgument { .. }
            | AuthError::Security { .. }
            | AuthError::Configuration { .. }
            | AuthError::Internal { .. } => Self::ServerError,
        }
    }
}

impl fmt::Display for AuthorizationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seal::AesGcmSealer;
    use crate::state::AuthorizationStateFactory;
    use crate::validation::Target;

    #[test]
    fn test_authorization_request_deserialize() {
        let json = r#"{
            "response_type": "code",
            "client_id": "client-1",
            "redirect_uri": "https://app.example/callback",
            "scope": "profile  email",
            "state": "xyz"
        }"#;

        let request: AuthorizationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.client_id.as_deref(), Some("client-1"));
        assert!(request.nonce.is_none());

        let command = request.into_command(Arc::new(AesGcmSealer::new(&[1u8; 32])));
        assert_eq!(
            command.scopes,
            Some(vec!["profile".to_string(), "email".to_string()])
        );
        assert_eq!(command.state.as_deref(), Some("xyz"));
        assert!(command.sealer.is_some());
    }

    #[test]
    fn test_missing_scope_stays_missing() {
        let request: AuthorizationRequest =
            serde_json::from_str(r#"{"response_type": "code"}"#).unwrap();
        let command = request.into_command(Arc::new(AesGcmSealer::new(&[1u8; 32])));
        assert!(command.scopes.is_none());
        assert!(command.client_id.is_none());
    }

    #[test]
    fn test_authorization_response_to_redirect_url() {
        let url = AuthorizationResponse::new("abc".to_string(), Some("x y&z".to_string()))
            .to_redirect_url("https://app.example/callback?tenant=1")
            .unwrap();
        assert_eq!(
            url,
            "https://app.example/callback?tenant=1&code=abc&state=x+y%26z"
        );

        let url = AuthorizationResponse::new("abc".to_string(), None)
            .to_redirect_url("https://app.example/callback")
            .unwrap();
        assert!(!url.contains("state="));
    }

    #[test]
    fn test_authorization_error_to_redirect_url() {
        let url = AuthorizationError::with_description(
            AuthorizationErrorCode::InvalidScope,
            "unknown scope",
            Some("xyz".to_string()),
        )
        .to_redirect_url("https://app.example/callback")
        .unwrap();
        assert!(url.contains("error=invalid_scope"));
        assert!(url.contains("error_description=unknown+scope"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_error_mapping() {
        let scope = AuthError::from(ValidationErrors::single(
            Target::new("Command", "scopes"),
            FailureCode::UnsupportedScope,
        ));
        assert_eq!(
            AuthorizationErrorCode::from(&scope),
            AuthorizationErrorCode::InvalidScope
        );
        assert!(AuthorizationError::can_redirect(&scope));

        let response_type = AuthError::from(ValidationErrors::single(
            Target::new("Command", "response_type"),
            FailureCode::PatternMismatch,
        ));
        assert_eq!(
            AuthorizationErrorCode::from(&response_type),
            AuthorizationErrorCode::UnsupportedResponseType
        );

        let redirect = AuthError::from(ValidationErrors::single(
            Target::new("Command", "redirect_uri"),
            FailureCode::UntrustedDomain,
        ));
        assert!(!AuthorizationError::can_redirect(&redirect));

        let storage = AuthError::storage("connection reset");
        let error = AuthorizationError::from_auth_error(&storage, None);
        assert_eq!(error.error, AuthorizationErrorCode::TemporarilyUnavailable);
        assert!(error.error_description.is_none());

        assert_eq!(
            AuthorizationErrorCode::from(&AuthError::Cancelled).as_str(),
            "temporarily_unavailable"
        );
    }

    #[test]
    fn test_missing_response_type_is_invalid_request() {
        let missing = AuthError::from(ValidationErrors::single(
            Target::new("Command", "response_type"),
            FailureCode::Required,
        ));
        assert_eq!(
            AuthorizationErrorCode::from(&missing),
            AuthorizationErrorCode::InvalidRequest
        );

        let blank = AuthError::from(ValidationErrors::single(
            Target::new("Command", "response_type"),
            FailureCode::Blank,
        ));
        assert_eq!(
            AuthorizationErrorCode::from(&blank),
            AuthorizationErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_tampered_state_is_not_described_or_redirected() {
        let factory = AuthorizationStateFactory::default();
        let state = factory
            .create("code", "client-1", "https://app.example/callback", &["profile".to_string()])
            .unwrap()
            .build();
        let sealed = factory
            .seal(&state, &AesGcmSealer::new(&[1u8; 32]))
            .unwrap();
        let err = factory
            .unseal(&sealed, &AesGcmSealer::new(&[9u8; 32]))
            .unwrap_err();
        assert!(err.validation_errors().is_some_and(|e| e.has_code(FailureCode::TamperedState)));

        assert!(!AuthorizationError::can_redirect(&err));

        let url = AuthorizationError::from_auth_error(&err, Some("xyz".to_string()))
            .to_redirect_url("https://app.example/callback")
            .unwrap();
        assert!(url.contains("error=invalid_request"));
        assert!(url.contains("error_description=invalid+state"));
        assert!(!url.contains("tampered_state"));
        assert!(!url.contains("AuthorizationState"));
        assert!(!url.contains("Validation+failed"));
    }

    #[test]
    fn test_validation_description_names_fields_only() {
        let mut validator = crate::validation::Validator::new();
        validator.fail_with(
            Target::new("PrepareAuthorizationCodeFlowCommand", "scopes"),
            FailureCode::UnsupportedScope,
            "admin",
        );
        let err = AuthError::from(validator.finish().unwrap_err());

        let error = AuthorizationError::from_auth_error(&err, None);
        assert_eq!(error.error, AuthorizationErrorCode::InvalidScope);
        assert_eq!(
            error.error_description.as_deref(),
            Some("scopes: unsupported_scope")
        );
    }
}

