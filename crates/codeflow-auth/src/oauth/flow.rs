//! Authorization code flow orchestration.
//!
//! [`AuthorizationCodeFlow`] wires the three commands to their
//! collaborators:
//!
//! - `prepare`: validate the request, build the state and seal it for the
//!   identity provider round trip
//! - `generate`: validate the callback, re-check the state against live data,
//!   bind the identity and issue a sealed code
//! - `authenticate`: redeem the code, check expiry, match it against the
//!   exchange request and consume it
//!
//! # Usage
//!
//! ```ignore
//! let flow = AuthorizationCodeFlow::from_config(&config, repository, consumption)?;
//! let prepared = flow.prepare(&request.into_command(sealer.clone()), &cancel).await?;
//! // ... identity provider round trip carrying prepared.sealed_state ...
//! let generated = flow.generate(&callback_command, &cancel).await?;
//! let location = generated.redirect_url()?;
//! // ... later, at the token endpoint ...
//! let redeemed = flow.authenticate(&token_request.into_command(header, sealer)?, &cancel).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::authenticate::AuthenticateAuthorizationCodeCommand;
use super::authorize::AuthorizationResponse;
use super::context::FlowContext;
use super::generate::GenerateAuthorizationCodeCommand;
use super::prepare::PrepareAuthorizationCodeFlowCommand;
use crate::AuthResult;
use crate::config::{CodeFlowConfig, ConfigError};
use crate::error::AuthError;
use crate::state::{AuthorizationData, AuthorizationState, IssuedCode, RedeemedCode};
use crate::storage::{CodeConsumptionStore, SecurityRepository};

/// Default authorization code lifetime.
pub const DEFAULT_CODE_LIFETIME: Duration = Duration::from_secs(600);

/// Result of a successful prepare step.
#[derive(Debug, Clone)]
pub struct PreparedAuthorization {
    /// The state as built from the request.
    pub state: AuthorizationState,
    /// The sealed state to hand to the identity provider.
    pub sealed_state: String,
}

/// Result of a successful generate step.
#[derive(Debug, Clone)]
pub struct GeneratedAuthorizationCode {
    /// The bound state the code was issued for.
    pub state: AuthorizationState,
    /// The sealed code and its expiry.
    pub issued: IssuedCode,
}

impl GeneratedAuthorizationCode {
    /// The authorization response echoing the caller's state.
    #[must_use]
    pub fn response(&self) -> AuthorizationResponse {
        AuthorizationResponse::new(
            self.issued.code.clone(),
            self.state.external_state().map(str::to_string),
        )
    }

    /// The redirect back to the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the bound redirect URI does not parse.
    pub fn redirect_url(&self) -> Result<String, url::ParseError> {
        self.response().to_redirect_url(self.state.redirect_uri())
    }
}

/// Runs the authorization code flow against injected collaborators.
#[derive(Clone)]
pub struct AuthorizationCodeFlow {
    ctx: FlowContext,
    consumption: Arc<dyn CodeConsumptionStore>,
    code_lifetime: Duration,
}

impl AuthorizationCodeFlow {
    /// Creates a flow with the default code lifetime.
    #[must_use]
    pub fn new(ctx: FlowContext, consumption: Arc<dyn CodeConsumptionStore>) -> Self {
        Self {
            ctx,
            consumption,
            code_lifetime: DEFAULT_CODE_LIFETIME,
        }
    }

    /// Builds a flow from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn from_config(
        config: &CodeFlowConfig,
        repository: Arc<dyn SecurityRepository>,
        consumption: Arc<dyn CodeConsumptionStore>,
    ) -> Result<Self, ConfigError> {
        let ctx = FlowContext::from_config(config, repository)?;
        Ok(Self::new(ctx, consumption).with_code_lifetime(config.authorization_code_lifetime))
    }

    /// Sets the authorization code lifetime.
    #[must_use]
    pub fn with_code_lifetime(mut self, lifetime: Duration) -> Self {
        self.code_lifetime = lifetime;
        self
    }

    /// The shared collaborators.
    #[must_use]
    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    /// Validates an authorization request and seals its state.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] with every failed rule
    /// - [`AuthError::Cancelled`] if `cancel` fires during client lookup
    /// - repository failures, unchanged
    pub async fn prepare(
        &self,
        command: &PrepareAuthorizationCodeFlowCommand,
        cancel: &CancellationToken,
    ) -> AuthResult<PreparedAuthorization> {
        if let Err(e) = cancellable(cancel, command.validate(&self.ctx)).await {
            tracing::debug!(error = %e, "Authorization request rejected");
            return Err(e);
        }

        let state = command.to_domain(&self.ctx.factory)?;
        let sealed_state = self.ctx.factory.seal(&state, command.sealer()?)?;

        tracing::info!(
            client_id = %state.client_id(),
            scope = %state.scope_string(),
            "Authorization request prepared"
        );

        Ok(PreparedAuthorization {
            state,
            sealed_state,
        })
    }

    /// Binds the authenticated identity to the returned state and issues
    /// a sealed authorization code.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] if the callback or the state is invalid,
    ///   including when live client, trust or scope data changed since
    ///   the state was prepared
    /// - [`AuthError::InvalidClient`] if the client disappeared
    /// - [`AuthError::Security`] if the state was already bound
    /// - [`AuthError::Cancelled`] if `cancel` fires during re-validation
    pub async fn generate(
        &self,
        command: &GenerateAuthorizationCodeCommand,
        cancel: &CancellationToken,
    ) -> AuthResult<GeneratedAuthorizationCode> {
        command.validate(&self.ctx)?;

        let bound = match cancellable(cancel, command.to_domain(&self.ctx)).await {
            Ok(bound) => bound,
            Err(e) => {
                tracing::warn!(error = %e, "Authorization state rejected on return");
                return Err(e);
            }
        };

        let issued = self.ctx.factory.issue_code(
            &bound.state,
            &bound.client,
            self.code_lifetime,
            command.sealer()?,
        )?;

        tracing::info!(
            client_id = %bound.client.client_id,
            authentication_type = ?bound.state.binding().and_then(|b| b.principal.authentication_type()),
            "Authorization code issued"
        );

        Ok(GeneratedAuthorizationCode {
            state: bound.state,
            issued,
        })
    }

    /// Exchanges an authorization code.
    ///
    /// The code is consumed only after it matched the request, so a failed
    /// attempt does not burn it. Consumption itself is not cancellable.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] if the request is structurally invalid
    /// - [`AuthError::InvalidGrant`] if the code does not open, has expired,
    ///   does not match the request or was already used
    /// - [`AuthError::Cancelled`] if `cancel` fires during matching
    /// - repository and store failures, unchanged
    pub async fn authenticate(
        &self,
        command: &AuthenticateAuthorizationCodeCommand,
        cancel: &CancellationToken,
    ) -> AuthResult<RedeemedCode> {
        command.validate(&self.ctx)?;

        let redeemed = command.redeem(&self.ctx.factory).map_err(|e| match e {
            AuthError::Validation(_) => {
                tracing::warn!(error = %e, "Authorization code rejected");
                AuthError::invalid_grant("authorization code is invalid")
            }
            other => other,
        })?;
        let client_id = redeemed
            .authorization_data
            .get(AuthorizationData::CLIENT_ID_KEY)
            .unwrap_or_default()
            .to_string();

        if redeemed.is_expired() {
            tracing::debug!(client_id = %client_id, "Authorization code expired");
            return Err(AuthError::invalid_grant("authorization code expired"));
        }

        let matched = cancellable(
            cancel,
            command.is_match(
                &redeemed.authorization_data,
                self.ctx.repository.as_ref(),
                self.ctx.trusted_domains.as_ref(),
            ),
        )
        .await?;
        if !matched {
            tracing::warn!(client_id = %client_id, "Authorization code does not match the exchange request");
            return Err(AuthError::invalid_grant(
                "authorization code does not match the request",
            ));
        }

        if !self
            .consumption
            .consume(&redeemed.code_id, redeemed.expires_at)
            .await?
        {
            tracing::warn!(client_id = %client_id, "Authorization code replay detected");
            return Err(AuthError::invalid_grant("authorization code already used"));
        }

        tracing::info!(client_id = %client_id, "Authorization code exchanged");
        Ok(redeemed)
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = AuthResult<T>>,
) -> AuthResult<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AuthError::Cancelled),
        result = operation => result,
    }
}
