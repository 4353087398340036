//! Authorization code flow error types.
//!
//! This module defines all error types that can occur while preparing,
//! generating and exchanging authorization codes.

use std::fmt;

use crate::validation::ValidationErrors;

/// Errors that can occur during the authorization code flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A required argument was missing or blank.
    ///
    /// This signals a programming or host error, not bad client input.
    #[error("Invalid argument: {name}")]
    InvalidArgument {
        /// Name of the offending argument.
        name: &'static str,
    },

    /// One or more validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// The client credentials are invalid or the client is not registered.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization code is invalid, expired, replayed or was issued
    /// for a different request.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// A security invariant could not be satisfied.
    #[error("Security error: {message}")]
    Security {
        /// Description of the violated invariant.
        message: String,
    },

    /// A collaborator failed while storing or retrieving data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The flow configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,
}

impl AuthError {
    /// Creates a new `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(name: &'static str) -> Self {
        Self::InvalidArgument { name }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `Security` error.
    #[must_use]
    pub fn security(message: impl Into<String>) -> Self {
        Self::Security {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the accumulated validation failures, if this is a validation error.
    #[must_use]
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidClient { .. } | Self::InvalidGrant { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::Security { .. }
                | Self::Storage { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. } => ErrorCategory::Internal,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::InvalidClient { .. } => ErrorCategory::Authentication,
            Self::InvalidGrant { .. } => ErrorCategory::Authentication,
            Self::Security { .. } => ErrorCategory::Security,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::Cancelled => ErrorCategory::Infrastructure,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::Cancelled => "temporarily_unavailable",
            Self::InvalidArgument { .. }
            | Self::Security { .. }
            | Self::Storage { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => "server_error",
        }
    }
}

impl From<ValidationErrors> for AuthError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Categories of flow errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client or grant authentication errors.
    Authentication,
    /// Request validation errors.
    Validation,
    /// Violated security invariants.
    Security,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Validation => write!(f, "validation"),
            Self::Security => write!(f, "security"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{FailureCode, Target, Validator};

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_client("client not found");
        assert_eq!(err.to_string(), "Invalid client: client not found");

        let err = AuthError::invalid_argument("client_id");
        assert_eq!(err.to_string(), "Invalid argument: client_id");

        let err = AuthError::Cancelled;
        assert_eq!(err.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_validation_error_display_lists_failures() {
        let mut validator = Validator::new();
        validator.fail(Target::new("Command", "client_id"), FailureCode::UnknownClient);
        let err = AuthError::from(validator.finish().unwrap_err());

        assert!(err.to_string().contains("Command.client_id"));
        assert!(err.to_string().contains("unknown_client"));
        assert_eq!(err.validation_errors().map(|e| e.len()), Some(1));
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::invalid_grant("test");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = AuthError::security("missing identifier");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());

        let err = AuthError::storage("database down");
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::invalid_client("test").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::configuration("test").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            AuthError::security("test").category(),
            ErrorCategory::Security
        );
        assert_eq!(
            AuthError::invalid_argument("scopes").category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_oauth_error_code() {
        assert_eq!(
            AuthError::invalid_client("test").oauth_error_code(),
            "invalid_client"
        );
        assert_eq!(
            AuthError::invalid_grant("test").oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            AuthError::configuration("missing salt").oauth_error_code(),
            "server_error"
        );
        assert_eq!(
            AuthError::storage("test").oauth_error_code(),
            "server_error"
        );
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Authentication.to_string(), "authentication");
        assert_eq!(ErrorCategory::Security.to_string(), "security");
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
    }
}
