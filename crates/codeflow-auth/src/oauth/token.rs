//! Token endpoint types.
//!
//! Only the `authorization_code` grant is supported. Clients authenticate
//! with `client_secret_basic` (HTTP Basic header) or `client_secret_post`
//! (credentials in the form body), never both at once.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::authenticate::AuthenticateAuthorizationCodeCommand;
use crate::error::AuthError;
use crate::seal::Sealer;

/// The only supported `grant_type`.
pub const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";

/// Token request parameters for the authorization code grant.
#[derive(Clone, Deserialize)]
pub struct TokenRequest {
    /// Must be `authorization_code`.
    pub grant_type: String,

    /// The sealed authorization code.
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI sent with the authorization request.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Client ID (`client_secret_post`, or alongside Basic).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (`client_secret_post`).
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl TokenRequest {
    /// Converts the request into an authenticate command.
    ///
    /// `authorization` is the raw `Authorization` header, if any.
    ///
    /// # Errors
    ///
    /// - `unsupported_grant_type` for any grant other than the code grant
    /// - `invalid_client` for a malformed Basic header or a body
    ///   `client_id` that disagrees with it
    /// - `invalid_request` when both authentication methods are used
    pub fn into_command(
        self,
        authorization: Option<&str>,
        sealer: Arc<dyn Sealer>,
    ) -> Result<AuthenticateAuthorizationCodeCommand, TokenError> {
        if self.grant_type != AUTHORIZATION_CODE_GRANT {
            return Err(TokenError::unsupported_grant_type(format!(
                "grant_type '{}' is not supported",
                self.grant_type
            )));
        }

        let (client_id, client_secret) = match authorization {
            Some(header) => {
                let (id, secret) = parse_basic_auth(header).ok_or_else(|| {
                    TokenError::invalid_client("malformed Basic authorization header")
                })?;
                if self.client_secret.is_some() {
                    return Err(TokenError::invalid_request(
                        "multiple client authentication methods",
                    ));
                }
                if self.client_id.as_deref().is_some_and(|body_id| body_id != id) {
                    return Err(TokenError::invalid_client(
                        "client_id does not match the authenticated client",
                    ));
                }
                (Some(id), Some(secret))
            }
            None => (self.client_id, self.client_secret),
        };

        Ok(AuthenticateAuthorizationCodeCommand {
            authorization_code: self.code,
            client_id,
            client_secret,
            redirect_uri: self.redirect_uri,
            sealer: Some(sealer),
        })
    }
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("code", &self.code.as_ref().map(|_| "<sealed>"))
            .field("redirect_uri", &self.redirect_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Token error response.
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "authorization code expired"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct TokenError {
    /// OAuth 2.0 error code.
    pub error: TokenErrorCode,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    /// Creates a new token error.
    #[must_use]
    pub fn new(error: TokenErrorCode) -> Self {
        Self {
            error,
            error_description: None,
        }
    }

    /// Creates a new token error with description.
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }

    /// Creates an invalid_request error.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::with_description(TokenErrorCode::InvalidRequest, description)
    }

    /// Creates an invalid_client error.
    #[must_use]
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::with_description(TokenErrorCode::InvalidClient, description)
    }

    /// Creates an invalid_grant error.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::with_description(TokenErrorCode::InvalidGrant, description)
    }

    /// Creates an unsupported_grant_type error.
    #[must_use]
    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::with_description(TokenErrorCode::UnsupportedGrantType, description)
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.error.http_status()
    }
}

impl From<&AuthError> for TokenError {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Validation(errors) => Self::invalid_request(errors.public_description()),
            AuthError::InvalidClient { message } => Self::invalid_client(message.clone()),
            AuthError::InvalidGrant { message } => Self::invalid_grant(message.clone()),
            AuthError::Cancelled | AuthError::Storage { .. } => {
                Self::new(TokenErrorCode::TemporarilyUnavailable)
            }
            AuthError::InvalidArgument { .. }
            | AuthError::Security { .. }
            | AuthError::Configuration { .. }
            | AuthError::Internal { .. } => Self::new(TokenErrorCode::ServerError),
        }
    }
}

/// OAuth 2.0 token error codes.
///
/// Defined in RFC 6749 Section 5.2, plus the server-side codes of
/// Section 4.1.2.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    /// The request is missing a required parameter or is otherwise malformed.
    InvalidRequest,

    /// Client authentication failed.
    InvalidClient,

    /// The authorization code is invalid, expired, replayed, or was issued
    /// to another client or redirect URI.
    InvalidGrant,

    /// The authenticated client is not authorized to use this grant type.
    UnauthorizedClient,

    /// The grant type is not supported.
    UnsupportedGrantType,

    /// The requested scope is invalid.
    InvalidScope,

    /// The server encountered an unexpected condition.
    ServerError,

    /// The server is temporarily unable to handle the request.
    TemporarilyUnavailable,
}

impl TokenErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::InvalidScope => 400,
            Self::ServerError => 500,
            Self::TemporarilyUnavailable => 503,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parses an HTTP Basic `Authorization` header into `(client_id, secret)`.
///
/// Returns `None` if the header is not Basic or does not decode.
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // Split on first colon (secret may contain colons)
    let (client_id, client_secret) = credentials.split_once(':')?;
    if client_id.is_empty() {
        return None;
    }

    Some((client_id.to_string(), client_secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seal::AesGcmSealer;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn sealer() -> Arc<dyn Sealer> {
        Arc::new(AesGcmSealer::new(&[2u8; 32]))
    }

    fn basic(id: &str, secret: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
    }

    fn request(json: &str) -> TokenRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_body_credentials() {
        let command = request(
            r#"{
                "grant_type": "authorization_code",
                "code": "abc",
                "redirect_uri": "https://app.example/callback",
                "client_id": "client-1",
                "client_secret": "s3cret"
            }"#,
        )
        .into_command(None, sealer())
        .unwrap();

        assert_eq!(command.authorization_code.as_deref(), Some("abc"));
        assert_eq!(command.client_id.as_deref(), Some("client-1"));
        assert_eq!(command.client_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_basic_credentials() {
        let header = basic("client-1", "s3:cret");
        let command = request(r#"{"grant_type": "authorization_code", "client_id": "client-1"}"#)
            .into_command(Some(&header), sealer())
            .unwrap();

        assert_eq!(command.client_id.as_deref(), Some("client-1"));
        assert_eq!(command.client_secret.as_deref(), Some("s3:cret"));
    }

    #[test]
    fn test_rejections() {
        let err = request(r#"{"grant_type": "refresh_token"}"#)
            .into_command(None, sealer())
            .unwrap_err();
        assert_eq!(err.error, TokenErrorCode::UnsupportedGrantType);

        let header = basic("client-1", "s3cret");
        let err = request(r#"{"grant_type": "authorization_code", "client_secret": "s3cret"}"#)
            .into_command(Some(&header), sealer())
            .unwrap_err();
        assert_eq!(err.error, TokenErrorCode::InvalidRequest);

        let err = request(r#"{"grant_type": "authorization_code", "client_id": "client-2"}"#)
            .into_command(Some(&header), sealer())
            .unwrap_err();
        assert_eq!(err.error, TokenErrorCode::InvalidClient);
        assert_eq!(err.http_status(), 401);

        let err = request(r#"{"grant_type": "authorization_code"}"#)
            .into_command(Some("Bearer abc"), sealer())
            .unwrap_err();
        assert_eq!(err.error, TokenErrorCode::InvalidClient);
    }

    #[test]
    fn test_parse_basic_auth() {
        assert_eq!(
            parse_basic_auth(&basic("client-1", "s3cret")),
            Some(("client-1".to_string(), "s3cret".to_string()))
        );
        assert_eq!(parse_basic_auth("Basic !!!"), None);
        assert_eq!(parse_basic_auth(&basic("", "s3cret")), None);
        assert_eq!(parse_basic_auth(&format!("Basic {}", STANDARD.encode("nocolon"))), None);
    }

    #[test]
    fn test_from_auth_error() {
        let err = TokenError::from(&AuthError::invalid_grant("authorization code already used"));
        assert_eq!(err.error, TokenErrorCode::InvalidGrant);
        assert_eq!(
            err.error_description.as_deref(),
            Some("authorization code already used")
        );

        let err = TokenError::from(&AuthError::internal("key mismatch"));
        assert_eq!(err.error, TokenErrorCode::ServerError);
        assert!(err.error_description.is_none());
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!(
            "{:?}",
            request(r#"{"grant_type": "authorization_code", "client_secret": "s3cret"}"#)
        );
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_validation_error_description() {
        use crate::validation::{FailureCode, Target, Validator};

        let mut validator = Validator::new();
        validator.fail(
            Target::new("AuthenticateAuthorizationCodeCommand", "client_secret"),
            FailureCode::Blank,
        );
        let err = TokenError::from(&AuthError::from(validator.finish().unwrap_err()));
        assert_eq!(err.error, TokenErrorCode::InvalidRequest);
        assert_eq!(err.error_description.as_deref(), Some("client_secret: blank"));

        let mut validator = Validator::new();
        validator.fail(
            Target::new("AuthorizationCode", "code"),
            FailureCode::MalformedState,
        );
        let err = TokenError::from(&AuthError::from(validator.finish().unwrap_err()));
        assert_eq!(err.error_description.as_deref(), Some("invalid state"));
    }
}

