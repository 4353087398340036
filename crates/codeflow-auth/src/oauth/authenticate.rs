//! Token endpoint matcher for the authorization code exchange.

use std::fmt;
use std::sync::Arc;

use url::Url;

use super::context::FlowContext;
use super::prepare::required;
use crate::AuthResult;
use crate::error::AuthError;
use crate::seal::Sealer;
use crate::state::{AuthorizationData, AuthorizationStateFactory, RedeemedCode};
use crate::storage::SecurityRepository;
use crate::trust::TrustedDomainResolver;
use crate::validation::{Target, Validator};

const TYPE_NAME: &str = "AuthenticateAuthorizationCodeCommand";

/// Matches a code exchange request against the data bound into the code.
#[derive(Clone, Default)]
pub struct AuthenticateAuthorizationCodeCommand {
    /// The sealed authorization code.
    pub authorization_code: Option<String>,
    /// Client presenting the code.
    pub client_id: Option<String>,
    /// The client's secret.
    pub client_secret: Option<String>,
    /// Redirect URI sent with the original authorization request.
    pub redirect_uri: Option<String>,
    /// Sealer that produced the code.
    pub sealer: Option<Arc<dyn Sealer>>,
}

impl AuthenticateAuthorizationCodeCommand {
    /// Creates a command with every field.
    #[must_use]
    pub fn new(
        authorization_code: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        sealer: Arc<dyn Sealer>,
    ) -> Self {
        Self {
            authorization_code: Some(authorization_code.into()),
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            redirect_uri: Some(redirect_uri.into()),
            sealer: Some(sealer),
        }
    }

    /// Structural checks on the request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] with all failures.
    pub fn validate(&self, ctx: &FlowContext) -> AuthResult<()> {
        let mut validator = Validator::new();
        validator
            .sealed_state(
                self.authorization_code.as_deref(),
                ctx.max_sealed_length,
                Target::new(TYPE_NAME, "authorization_code"),
            )
            .string(self.client_id.as_deref(), Target::new(TYPE_NAME, "client_id"))
            .not_blank()
            .done()
            .string(
                self.client_secret.as_deref(),
                Target::new(TYPE_NAME, "client_secret"),
            )
            .not_blank()
            .done()
            .string(
                self.redirect_uri.as_deref(),
                Target::new(TYPE_NAME, "redirect_uri"),
            )
            .not_blank()
            .absolute_uri()
            .done()
            .object(self.sealer.as_ref(), Target::new(TYPE_NAME, "sealer"));
        validator.finish()?;
        Ok(())
    }

    /// Opens the authorization code.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the code is malformed or was not
    /// sealed by this command's sealer, or [`AuthError::InvalidArgument`] if
    /// the code or sealer is absent.
    pub fn redeem(&self, factory: &AuthorizationStateFactory) -> AuthResult<RedeemedCode> {
        let code = required(self.authorization_code.as_deref(), "authorization_code")?;
        factory.redeem_code(code, self.sealer()?)
    }

    /// Compares the request against `data` and live client and trust data.
    ///
    /// Checks short-circuit in this order:
    /// 1. bound client id equals the request's
    /// 2. bound secret equals the request's
    /// 3. bound redirect URI is absolute and equals the request's
    /// 4. the registered client exists and its secret equals the request's
    /// 5. the redirect URI is still trusted
    ///
    /// All comparisons are case-sensitive; secrets are compared in constant
    /// time.
    ///
    /// # Errors
    ///
    /// A mismatch is `Ok(false)`. Only repository failures are errors.
    pub async fn is_match(
        &self,
        data: &AuthorizationData,
        repository: &dyn SecurityRepository,
        trusted_domains: &dyn TrustedDomainResolver,
    ) -> AuthResult<bool> {
        let (Some(client_id), Some(client_secret), Some(redirect_uri)) = (
            self.client_id.as_deref(),
            self.client_secret.as_deref(),
            self.redirect_uri.as_deref(),
        ) else {
            return Ok(false);
        };

        if data.get(AuthorizationData::CLIENT_ID_KEY) != Some(client_id) {
            tracing::debug!("Code exchange rejected: client id mismatch");
            return Ok(false);
        }

        let bound_secret = data.get(AuthorizationData::CLIENT_SECRET_KEY);
        if !bound_secret.is_some_and(|bound| constant_time_eq(bound, client_secret)) {
            tracing::debug!(client_id = %client_id, "Code exchange rejected: bound secret mismatch");
            return Ok(false);
        }

        let Some(bound_redirect) = data.get(AuthorizationData::REDIRECT_URI_KEY) else {
            tracing::debug!(client_id = %client_id, "Code exchange rejected: no bound redirect URI");
            return Ok(false);
        };
        if Url::parse(bound_redirect).is_err() || bound_redirect != redirect_uri {
            tracing::debug!(client_id = %client_id, "Code exchange rejected: redirect URI mismatch");
            return Ok(false);
        }

        let Some(client) = repository.find_client_secret_identity(client_id).await? else {
            tracing::debug!(client_id = %client_id, "Code exchange rejected: unknown client");
            return Ok(false);
        };
        if !constant_time_eq(&client.client_secret, client_secret) {
            tracing::debug!(client_id = %client_id, "Code exchange rejected: client authentication failed");
            return Ok(false);
        }

        let trusted = Url::parse(redirect_uri)
            .map(|url| trusted_domains.is_trusted_domain(&url))
            .unwrap_or(false);
        if !trusted {
            tracing::warn!(client_id = %client_id, "Code exchange rejected: redirect URI no longer trusted");
            return Ok(false);
        }

        Ok(true)
    }

    /// The sealer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidArgument`] if no sealer was supplied.
    pub fn sealer(&self) -> AuthResult<&dyn Sealer> {
        self.sealer
            .as_deref()
            .ok_or(AuthError::invalid_argument("sealer"))
    }
}

impl fmt::Debug for AuthenticateAuthorizationCodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticateAuthorizationCodeCommand")
            .field(
                "authorization_code",
                &self.authorization_code.as_ref().map(|_| "<sealed>"),
            )
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("sealer", &self.sealer.is_some())
            .finish()
    }
}

/// Byte-wise equality whose running time does not depend on where the
/// inputs differ.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
