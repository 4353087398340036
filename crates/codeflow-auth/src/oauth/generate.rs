//! Identity provider callback: binds the authenticated user to the state.

use std::fmt;
use std::sync::Arc;

use super::context::FlowContext;
use super::prepare::required;
use crate::AuthResult;
use crate::error::AuthError;
use crate::principal::ClaimsPrincipal;
use crate::seal::Sealer;
use crate::state::{AuthorizationState, generate_code_id};
use crate::storage::ClientSecretIdentity;
use crate::validation::{Target, Validator};

const TYPE_NAME: &str = "GenerateAuthorizationCodeCommand";

/// A state with an identity bound, ready for code issuance.
#[derive(Debug, Clone)]
pub struct BoundAuthorization {
    /// The bound state.
    pub state: AuthorizationState,
    /// The client resolved while re-validating the state.
    pub client: ClientSecretIdentity,
}

/// Validates the sealed state returned by the identity provider and binds
/// the authenticated principal and ID token to it.
#[derive(Clone, Default)]
pub struct GenerateAuthorizationCodeCommand {
    /// Sealed state from the callback.
    pub state: Option<String>,
    /// The now-authenticated principal.
    pub principal: Option<ClaimsPrincipal>,
    /// ID token issued for the principal.
    pub id_token: Option<String>,
    /// Sealer that produced the state.
    pub sealer: Option<Arc<dyn Sealer>>,
}

impl GenerateAuthorizationCodeCommand {
    /// Creates a command with every field.
    #[must_use]
    pub fn new(
        state: impl Into<String>,
        principal: ClaimsPrincipal,
        id_token: impl Into<String>,
        sealer: Arc<dyn Sealer>,
    ) -> Self {
        Self {
            state: Some(state.into()),
            principal: Some(principal),
            id_token: Some(id_token.into()),
            sealer: Some(sealer),
        }
    }

    /// Checks the sealed state's structure and the presence of the sealer,
    /// an authenticated principal and the ID token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] with all failures.
    pub fn validate(&self, ctx: &FlowContext) -> AuthResult<()> {
        let mut validator = Validator::new();
        validator
            .sealed_state(
                self.state.as_deref(),
                ctx.max_sealed_length,
                Target::new(TYPE_NAME, "state"),
            )
            .object(self.sealer.as_ref(), Target::new(TYPE_NAME, "sealer"))
            .claims(self.principal.as_ref(), Target::new(TYPE_NAME, "principal"))
            .id_token(self.id_token.as_deref(), Target::new(TYPE_NAME, "id_token"));
        validator.finish()?;
        Ok(())
    }

    /// Unseals the state, re-validates it against live client, trust and
    /// scope data, and binds the principal, ID token and a fresh code id.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] if the state is malformed, tampered,
    ///   expired or no longer valid against live data
    /// - [`AuthError::Security`] if the state already carries an identity
    /// - [`AuthError::InvalidArgument`] if a field is absent; call
    ///   [`Self::validate`] first
    /// - repository failures, unchanged
    pub async fn to_domain(&self, ctx: &FlowContext) -> AuthResult<BoundAuthorization> {
        let token = required(self.state.as_deref(), "state")?;
        let sealer = self
            .sealer
            .as_deref()
            .ok_or(AuthError::invalid_argument("sealer"))?;
        let principal = self
            .principal
            .clone()
            .ok_or(AuthError::invalid_argument("principal"))?;
        let id_token = required(self.id_token.as_deref(), "id_token")?;

        let state = ctx.factory.unseal(token, sealer)?;

        let mut validator = Validator::new();
        validator.response_type(
            Some(state.response_type()),
            &ctx.response_type_pattern,
            Target::new("AuthorizationState", "response_type"),
        );
        let client = validator
            .authorization_state(
                &state,
                ctx.repository.as_ref(),
                ctx.trusted_domains.as_ref(),
                ctx.scopes.as_ref(),
            )
            .await?;
        validator.finish()?;

        let Some(client) = client else {
            return Err(AuthError::invalid_client("client is no longer registered"));
        };

        let state = state.bind(principal, id_token, generate_code_id())?;
        Ok(BoundAuthorization { state, client })
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

impl fmt::Debug for GenerateAuthorizationCodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateAuthorizationCodeCommand")
            .field("state", &self.state.as_ref().map(|_| "<sealed>"))
            .field(
                "authentication_type",
                &self
                    .principal
                    .as_ref()
                    .and_then(ClaimsPrincipal::authentication_type),
            )
            .field("id_token", &self.id_token.is_some())
            .field("sealer", &self.sealer.is_some())
            .finish()
    }
}
