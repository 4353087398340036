//! Authorization request intake.

use std::fmt;
use std::sync::Arc;

use super::context::FlowContext;
use crate::AuthResult;
use crate::error::AuthError;
use crate::seal::Sealer;
use crate::state::{AuthorizationState, AuthorizationStateFactory};
use crate::validation::{Target, Validator};

const TYPE_NAME: &str = "PrepareAuthorizationCodeFlowCommand";

/// Validates an inbound authorization request and builds its state.
///
/// Fields are optional so that absent parameters surface as validation
/// failures rather than deserialization errors.
#[derive(Clone, Default)]
pub struct PrepareAuthorizationCodeFlowCommand {
    /// Requested response type; must be `code`.
    pub response_type: Option<String>,
    /// Requesting client.
    pub client_id: Option<String>,
    /// Where the result is delivered.
    pub redirect_uri: Option<String>,
    /// Requested scopes.
    pub scopes: Option<Vec<String>>,
    /// Opaque caller state.
    pub state: Option<String>,
    /// ID token nonce.
    pub nonce: Option<String>,
    /// Sealer for the resulting state.
    pub sealer: Option<Arc<dyn Sealer>>,
}

impl PrepareAuthorizationCodeFlowCommand {
    /// Creates a command with every required field.
    #[must_use]
    pub fn new(
        response_type: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
        sealer: Arc<dyn Sealer>,
    ) -> Self {
        Self {
            response_type: Some(response_type.into()),
            client_id: Some(client_id.into()),
            redirect_uri: Some(redirect_uri.into()),
            scopes: Some(scopes),
            state: None,
            nonce: None,
            sealer: Some(sealer),
        }
    }

    /// Sets the caller state.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Sets the nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Runs, in order: response type, client id, redirect uri, scopes,
    /// state, nonce and sealer presence. Every failure is reported.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] with all failures, or propagates
    /// repository failures.
    pub async fn validate(&self, ctx: &FlowContext) -> AuthResult<()> {
        let mut validator = Validator::new();

        validator.response_type(
            self.response_type.as_deref(),
            &ctx.response_type_pattern,
            Target::new(TYPE_NAME, "response_type"),
        );
        validator
            .client_id(
                self.client_id.as_deref(),
                ctx.repository.as_ref(),
                Target::new(TYPE_NAME, "client_id"),
            )
            .await?;
        validator
            .redirect_uri(
                self.redirect_uri.as_deref(),
                ctx.trusted_domains.as_ref(),
                Target::new(TYPE_NAME, "redirect_uri"),
            )
            .scopes(
                self.scopes.as_deref(),
                ctx.scopes.as_ref(),
                Target::new(TYPE_NAME, "scopes"),
            )
            .external_state(self.state.as_deref(), Target::new(TYPE_NAME, "state"), true)
            .nonce(self.nonce.as_deref(), Target::new(TYPE_NAME, "nonce"), true)
            .object(self.sealer.as_ref(), Target::new(TYPE_NAME, "sealer"));

        validator.finish()?;
        Ok(())
    }

    /// Builds the authorization state. Caller state and nonce are attached
    /// only when supplied.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidArgument`] if a required field is absent
    /// or blank; call [`Self::validate`] first.
    pub fn to_domain(&self, factory: &AuthorizationStateFactory) -> AuthResult<AuthorizationState> {
        let mut builder = factory.create(
            required(self.response_type.as_deref(), "response_type")?,
            required(self.client_id.as_deref(), "client_id")?,
            required(self.redirect_uri.as_deref(), "redirect_uri")?,
            self.scopes
                .as_deref()
                .ok_or(AuthError::invalid_argument("scopes"))?,
        )?;
        if let Some(ref state) = self.state {
            builder = builder.with_external_state(state.clone())?;
        }
        if let Some(ref nonce) = self.nonce {
            builder = builder.with_nonce(nonce.clone())?;
        }
        Ok(builder.build())
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

impl fmt::Debug for PrepareAuthorizationCodeFlowCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrepareAuthorizationCodeFlowCommand")
            .field("response_type", &self.response_type)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("state", &self.state.is_some())
            .field("nonce", &self.nonce.is_some())
            .field("sealer", &self.sealer.is_some())
            .finish()
    }
}

pub(crate) fn required<'a>(value: Option<&'a str>, name: &'static str) -> AuthResult<&'a str> {
    value.ok_or(AuthError::invalid_argument(name))
}
