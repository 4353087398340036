//! Authorization state and its sealed transport.
//!
//! An [`AuthorizationState`] records one in-flight authorization request. It
//! travels through the identity provider redirect as a sealed, base64url
//! encoded token and comes back as the authorization code once the user has
//! authenticated:
//!
//! ```text
//! prepare ──► seal ──► IdP round trip ──► unseal ──► bind ──► issue_code
//!                                                                │
//!                        token endpoint ◄── redeem_code ◄────────┘
//! ```
//!
//! Unsealing is the anti-tamper checkpoint. Every decoding failure surfaces
//! as a validation error distinguishing structural damage
//! ([`FailureCode::MalformedState`]) from cryptographic rejection
//! ([`FailureCode::TamperedState`]).

pub(crate) mod codec;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use time::OffsetDateTime;

use crate::error::AuthError;
use crate::principal::ClaimsPrincipal;
use crate::seal::Sealer;
use crate::storage::ClientSecretIdentity;
use crate::validation::{FailureCode, Target, ValidationErrors, Validator};
use crate::AuthResult;

use codec::{FrameReader, FrameWriter, TokenKind};

/// Tolerated clock difference between the sealing and unsealing host.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

const STATE_TARGET: Target = Target::new("AuthorizationState", "state");
const CODE_TARGET: Target = Target::new("AuthorizationCode", "code");

// =============================================================================
// Authorization State
// =============================================================================

/// Identity bound to a state once the user has authenticated.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityBinding {
    /// The authenticated principal.
    pub principal: ClaimsPrincipal,
    /// Serialized ID token issued for the principal.
    pub id_token: String,
    /// Identifier of the authorization code minted for this binding.
    pub code_id: String,
}

impl fmt::Debug for IdentityBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityBinding")
            .field("authentication_type", &self.principal.authentication_type())
            .field("id_token", &"<redacted>")
            .field("code_id", &"<redacted>")
            .finish()
    }
}

/// An in-flight authorization request.
///
/// The request fields are fixed by [`AuthorizationStateBuilder::build`]. The
/// identity binding is written once by [`AuthorizationState::bind`] and never
/// replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationState {
    response_type: String,
    client_id: String,
    redirect_uri: String,
    scopes: BTreeSet<String>,
    external_state: Option<String>,
    nonce: Option<String>,
    binding: Option<IdentityBinding>,
}

impl AuthorizationState {
    /// The requested response type.
    #[must_use]
    pub fn response_type(&self) -> &str {
        &self.response_type
    }

    /// The requesting client.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Where the authorization result is delivered.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// The requested scopes.
    #[must_use]
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    /// Opaque caller state, echoed back unmodified.
    #[must_use]
    pub fn external_state(&self) -> Option<&str> {
        self.external_state.as_deref()
    }

    /// Nonce to be embedded in the ID token.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    /// The bound identity, if the user has authenticated.
    #[must_use]
    pub fn binding(&self) -> Option<&IdentityBinding> {
        self.binding.as_ref()
    }

    /// Returns `true` once an identity has been bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Requested scopes joined by a single space.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Binds the authenticated principal, ID token and code identifier.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Security`] if an identity is already bound
    /// - [`AuthError::InvalidArgument`] if the principal is unauthenticated
    ///   or the ID token or code identifier is blank
    pub fn bind(
        mut self,
        principal: ClaimsPrincipal,
        id_token: impl Into<String>,
        code_id: impl Into<String>,
    ) -> AuthResult<Self> {
        if self.binding.is_some() {
            return Err(AuthError::security(
                "authorization state is already bound to an identity",
            ));
        }
        if !principal.is_authenticated() {
            return Err(AuthError::invalid_argument("principal"));
        }
        let id_token = non_blank(id_token.into(), "id_token")?;
        let code_id = non_blank(code_id.into(), "code_id")?;

        self.binding = Some(IdentityBinding {
            principal,
            id_token,
            code_id,
        });
        Ok(self)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds an [`AuthorizationState`] from validated request fields.
///
/// Obtained from [`AuthorizationStateFactory::create`].
#[derive(Debug)]
pub struct AuthorizationStateBuilder {
    state: AuthorizationState,
}

impl AuthorizationStateBuilder {
    /// Attaches the caller's opaque state.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidArgument`] if `state` is blank or was
    /// already set.
    pub fn with_external_state(mut self, state: impl Into<String>) -> AuthResult<Self> {
        if self.state.external_state.is_some() {
            return Err(AuthError::invalid_argument("external_state"));
        }
        self.state.external_state = Some(non_blank(state.into(), "external_state")?);
        Ok(self)
    }

    /// Attaches the ID token nonce.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidArgument`] if `nonce` is blank or was
    /// already set.
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> AuthResult<Self> {
        if self.state.nonce.is_some() {
            return Err(AuthError::invalid_argument("nonce"));
        }
        self.state.nonce = Some(non_blank(nonce.into(), "nonce")?);
        Ok(self)
    }

    /// Finishes the state.
    #[must_use]
    pub fn build(self) -> AuthorizationState {
        self.state
    }
}

fn non_blank(value: String, name: &'static str) -> AuthResult<String> {
    if value.trim().is_empty() {
        Err(AuthError::invalid_argument(name))
    } else {
        Ok(value)
    }
}

// =============================================================================
// Issued / Redeemed Codes
// =============================================================================

/// Flat key/value data bound into an authorization code at issuance.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthorizationData(BTreeMap<String, String>);

impl AuthorizationData {
    /// Key of the client identifier.
    pub const CLIENT_ID_KEY: &'static str = "client_id";
    /// Key of the client secret.
    pub const CLIENT_SECRET_KEY: &'static str = "client_secret";
    /// Key of the redirect URI.
    pub const REDIRECT_URI_KEY: &'static str = "redirect_uri";

    /// Creates empty data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Removes the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AuthorizationData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for AuthorizationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.0 {
            if key == Self::CLIENT_SECRET_KEY {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Keys of [`RedeemedCode::session_items`].
pub mod session_items {
    /// Space-delimited granted scopes.
    pub const SCOPE: &str = "scope";
    /// Caller state from the authorization request.
    pub const STATE: &str = "state";
    /// ID token nonce from the authorization request.
    pub const NONCE: &str = "nonce";
}

/// A sealed authorization code ready to hand to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    /// The opaque code.
    pub code: String,
    /// When the code stops being redeemable.
    pub expires_at: OffsetDateTime,
}

/// Everything bound into an authorization code.
#[derive(Debug, Clone)]
pub struct RedeemedCode {
    /// Client id, secret and redirect URI bound at issuance.
    pub authorization_data: AuthorizationData,
    /// The authenticated principal.
    pub principal: ClaimsPrincipal,
    /// The scheme that authenticated the principal.
    pub authentication_type: Option<String>,
    /// Serialized ID token.
    pub id_token: String,
    /// Scope, state and nonce of the original request.
    pub session_items: BTreeMap<String, String>,
    /// Single-use identifier of the code.
    pub code_id: String,
    /// When the code stops being redeemable.
    pub expires_at: OffsetDateTime,
}

impl RedeemedCode {
    /// Returns `true` if the code has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

/// Generates a 256-bit random code identifier, base64url encoded.
#[must_use]
pub fn generate_code_id() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// =============================================================================
// Factory
// =============================================================================

/// Creates, seals and unseals authorization states and codes.
#[derive(Debug, Clone)]
pub struct AuthorizationStateFactory {
    state_lifetime: Duration,
}

impl Default for AuthorizationStateFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }
}

impl AuthorizationStateFactory {
    /// Creates a factory rejecting sealed states older than `state_lifetime`.
    #[must_use]
    pub fn new(state_lifetime: Duration) -> Self {
        Self { state_lifetime }
    }

    /// Maximum age of a sealed state.
    #[must_use]
    pub fn state_lifetime(&self) -> Duration {
        self.state_lifetime
    }

    /// Starts a new state.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidArgument`] if any argument is blank, if
    /// `scopes` is empty or if it contains a blank scope.
    pub fn create(
        &self,
        response_type: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> AuthResult<AuthorizationStateBuilder> {
        let response_type = non_blank(response_type.to_string(), "response_type")?;
        let client_id = non_blank(client_id.to_string(), "client_id")?;
        let redirect_uri = non_blank(redirect_uri.to_string(), "redirect_uri")?;
        if scopes.is_empty() || scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(AuthError::invalid_argument("scopes"));
        }

        Ok(AuthorizationStateBuilder {
            state: AuthorizationState {
                response_type,
                client_id,
                redirect_uri,
                scopes: scopes.iter().cloned().collect(),
                external_state: None,
                nonce: None,
                binding: None,
            },
        })
    }

    /// Seals `state` into an opaque base64url token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if framing or sealing fails.
    pub fn seal(&self, state: &AuthorizationState, sealer: &dyn Sealer) -> AuthResult<String> {
        let mut writer = FrameWriter::new(TokenKind::State, now_unix());
        codec::write_state(&mut writer, state)
            .map_err(|e| AuthError::internal(format!("failed to frame state: {e}")))?;
        seal_frame(writer, sealer)
    }

    /// Opens a token produced by [`AuthorizationStateFactory::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] carrying
    /// [`FailureCode::MalformedState`], [`FailureCode::TamperedState`] or
    /// [`FailureCode::ExpiredState`].
    pub fn unseal(&self, token: &str, sealer: &dyn Sealer) -> AuthResult<AuthorizationState> {
        let plaintext = open_token(token, sealer, STATE_TARGET)?;
        let (state, issued_at) =
            decode(&plaintext, TokenKind::State, STATE_TARGET, codec::read_state)?;

        let Some(age) = now_unix().checked_sub(issued_at) else {
            return Err(ValidationErrors::single(STATE_TARGET, FailureCode::MalformedState).into());
        };

        let mut validator = Validator::new();
        validator
            .integer(Some(age), STATE_TARGET)
            .between(
                -MAX_CLOCK_SKEW_SECS,
                duration_secs(self.state_lifetime),
                FailureCode::ExpiredState,
            )
            .done();
        validator.finish()?;

        Ok(state)
    }

    /// Seals a bound state together with the client's secret into an
    /// authorization code valid for `lifetime`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidArgument`] if `state` has no bound identity
    /// - [`AuthError::InvalidClient`] if `client` is not the state's client
    /// - [`AuthError::Internal`] if framing or sealing fails
    pub fn issue_code(
        &self,
        state: &AuthorizationState,
        client: &ClientSecretIdentity,
        lifetime: Duration,
        sealer: &dyn Sealer,
    ) -> AuthResult<IssuedCode> {
        if !state.is_bound() {
            return Err(AuthError::invalid_argument("state"));
        }
        if client.client_id != state.client_id {
            return Err(AuthError::invalid_client(
                "client does not match the authorization state",
            ));
        }

        let now = now_unix();
        let expires_at = now.saturating_add(duration_secs(lifetime));
        let expires_at = OffsetDateTime::from_unix_timestamp(expires_at)
            .map_err(|e| AuthError::internal(format!("invalid code expiry: {e}")))?;

        let mut writer = FrameWriter::new(TokenKind::Code, now);
        codec::write_state(&mut writer, state)
            .and_then(|()| writer.put_str(&client.client_secret))
            .map_err(|e| AuthError::internal(format!("failed to frame code: {e}")))?;
        writer.put_i64(expires_at.unix_timestamp());

        Ok(IssuedCode {
            code: seal_frame(writer, sealer)?,
            expires_at,
        })
    }

    /// Opens an authorization code produced by
    /// [`AuthorizationStateFactory::issue_code`].
    ///
    /// Expiry is reported through [`RedeemedCode::expires_at`], not checked.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] carrying
    /// [`FailureCode::MalformedState`] or [`FailureCode::TamperedState`].
    pub fn redeem_code(&self, code: &str, sealer: &dyn Sealer) -> AuthResult<RedeemedCode> {
        let plaintext = open_token(code, sealer, CODE_TARGET)?;
        let ((mut state, client_secret, expires_at), _) =
            decode(&plaintext, TokenKind::Code, CODE_TARGET, |reader| {
                let state = codec::read_state(reader)?;
                let client_secret = reader.string()?;
                let expires_at = reader.i64()?;
                Ok((state, client_secret, expires_at))
            })?;

        let malformed =
            || AuthError::from(ValidationErrors::single(CODE_TARGET, FailureCode::MalformedState));
        let expires_at = OffsetDateTime::from_unix_timestamp(expires_at).map_err(|_| malformed())?;
        let Some(binding) = state.binding.take() else {
            return Err(malformed());
        };

        let authorization_data: AuthorizationData = [
            (AuthorizationData::CLIENT_ID_KEY, state.client_id.clone()),
            (AuthorizationData::CLIENT_SECRET_KEY, client_secret),
            (AuthorizationData::REDIRECT_URI_KEY, state.redirect_uri.clone()),
        ]
        .into_iter()
        .collect();

        let mut items = BTreeMap::new();
        items.insert(session_items::SCOPE.to_string(), state.scope_string());
        if let Some(external_state) = state.external_state {
            items.insert(session_items::STATE.to_string(), external_state);
        }
        if let Some(nonce) = state.nonce {
            items.insert(session_items::NONCE.to_string(), nonce);
        }

        Ok(RedeemedCode {
            authorization_data,
            authentication_type: binding.principal.authentication_type().map(str::to_string),
            principal: binding.principal,
            id_token: binding.id_token,
            session_items: items,
            code_id: binding.code_id,
            expires_at,
        })
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn duration_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn seal_frame(writer: FrameWriter, sealer: &dyn Sealer) -> AuthResult<String> {
    let sealed = sealer
        .seal(&writer.finish())
        .map_err(|e| AuthError::internal(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(sealed))
}

fn open_token(token: &str, sealer: &dyn Sealer, target: Target) -> AuthResult<Vec<u8>> {
    let sealed = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|e| {
        tracing::debug!(error = %e, field = target.field, "sealed token is not base64url");
        ValidationErrors::single(target, FailureCode::MalformedState)
    })?;
    sealer.open(&sealed).map_err(|e| {
        tracing::warn!(error = %e, field = target.field, "sealed token rejected by sealer");
        ValidationErrors::single(target, FailureCode::TamperedState).into()
    })
}

fn decode<T>(
    plaintext: &[u8],
    kind: TokenKind,
    target: Target,
    read: impl FnOnce(&mut FrameReader<'_>) -> Result<T, codec::FrameError>,
) -> AuthResult<(T, i64)> {
    let result = FrameReader::open(plaintext, kind).and_then(|(mut reader, issued_at)| {
        let value = read(&mut reader)?;
        reader.finish()?;
        Ok((value, issued_at))
    });
    result.map_err(|e| {
        tracing::warn!(error = %e, field = target.field, "sealed token is malformed");
        ValidationErrors::single(target, FailureCode::MalformedState).into()
    })
}
