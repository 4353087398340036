//! Authorization code flow rules.
//!
//! Each rule records its failures on the [`Validator`] and keeps going, so a
//! request is always reported in full. Rules that consult a collaborator are
//! `async` and return the resolved value alongside; collaborator failures are
//! propagated as errors and never recorded as validation failures.

use regex::Regex;
use url::Url;

use super::{FailureCode, Target, Validator};
use crate::AuthResult;
use crate::principal::ClaimsPrincipal;
use crate::scopes::SupportedScopesProvider;
use crate::state::AuthorizationState;
use crate::storage::{ClientSecretIdentity, SecurityRepository};
use crate::trust::TrustedDomainResolver;

impl Validator {
    /// The response type must match `pattern`.
    pub fn response_type(
        &mut self,
        value: Option<&str>,
        pattern: &Regex,
        target: Target,
    ) -> &mut Self {
        self.string(value, target).not_blank().matches(pattern).done()
    }

    /// The client id must be non-blank and resolve to a registered client.
    ///
    /// Returns the resolved client.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub async fn client_id(
        &mut self,
        value: Option<&str>,
        repository: &dyn SecurityRepository,
        target: Target,
    ) -> AuthResult<Option<ClientSecretIdentity>> {
        let Some(client_id) = self
            .string(value, target)
            .not_blank()
            .min_length(1)
            .valid_value()
        else {
            return Ok(None);
        };

        let client = repository.find_client_secret_identity(client_id).await?;
        if client.is_none() {
            tracing::debug!(client_id = %client_id, "client id does not resolve");
            self.fail(target, FailureCode::UnknownClient);
        }
        Ok(client)
    }

    /// The redirect URI must be an absolute URI on a trusted domain.
    pub fn redirect_uri(
        &mut self,
        value: Option<&str>,
        resolver: &dyn TrustedDomainResolver,
        target: Target,
    ) -> &mut Self {
        let Some(uri) = self
            .string(value, target)
            .not_blank()
            .absolute_uri()
            .valid_value()
        else {
            return self;
        };

        let trusted = Url::parse(uri).is_ok_and(|url| resolver.is_trusted_domain(&url));
        if !trusted {
            tracing::debug!(redirect_uri = %uri, "redirect uri is not on a trusted domain");
            self.fail(target, FailureCode::UntrustedDomain);
        }
        self
    }

    /// Scopes must be present, non-empty, no more numerous than the supported
    /// scopes and each one supported. Unknown scopes are reported, never
    /// dropped.
    pub fn scopes(
        &mut self,
        values: Option<&[String]>,
        provider: &dyn SupportedScopesProvider,
        target: Target,
    ) -> &mut Self {
        let supported = provider.supported_scopes();
        self.enumerable(values, target)
            .required()
            .min_count(1)
            .max_count(supported.len())
            .each(|scope| supported.contains_key(scope), FailureCode::UnsupportedScope)
            .done()
    }

    /// Caller state must be non-empty when present.
    pub fn external_state(
        &mut self,
        value: Option<&str>,
        target: Target,
        optional: bool,
    ) -> &mut Self {
        self.optional_token(value, target, optional)
    }

    /// Nonce must be non-empty when present.
    pub fn nonce(&mut self, value: Option<&str>, target: Target, optional: bool) -> &mut Self {
        self.optional_token(value, target, optional)
    }

    fn optional_token(
        &mut self,
        value: Option<&str>,
        target: Target,
        optional: bool,
    ) -> &mut Self {
        let rules = self.string(value, target);
        let rules = if optional { rules } else { rules.required() };
        rules.min_length(1).done()
    }

    /// A sealed token must be a non-blank base64url string of plausible
    /// length. Checked before any unseal is attempted.
    pub fn sealed_state(
        &mut self,
        value: Option<&str>,
        max_length: usize,
        target: Target,
    ) -> &mut Self {
        self.string(value, target)
            .not_blank()
            .max_length(max_length)
            .must(is_base64url, FailureCode::MalformedState)
            .done()
    }

    /// Re-checks the client, redirect URI and scopes carried by a decoded
    /// state against live data.
    ///
    /// Returns the resolved client.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub async fn authorization_state(
        &mut self,
        state: &AuthorizationState,
        repository: &dyn SecurityRepository,
        resolver: &dyn TrustedDomainResolver,
        provider: &dyn SupportedScopesProvider,
    ) -> AuthResult<Option<ClientSecretIdentity>> {
        const CLIENT_ID: Target = Target::new("AuthorizationState", "client_id");
        const REDIRECT_URI: Target = Target::new("AuthorizationState", "redirect_uri");
        const SCOPES: Target = Target::new("AuthorizationState", "scopes");

        let client = self
            .client_id(Some(state.client_id()), repository, CLIENT_ID)
            .await?;
        let scopes: Vec<String> = state.scopes().iter().cloned().collect();
        self.redirect_uri(Some(state.redirect_uri()), resolver, REDIRECT_URI)
            .scopes(Some(scopes.as_slice()), provider, SCOPES);
        Ok(client)
    }

    /// The principal must be present and authenticated.
    pub fn claims(&mut self, principal: Option<&ClaimsPrincipal>, target: Target) -> &mut Self {
        match principal {
            None => self.fail(target, FailureCode::Required),
            Some(principal) if !principal.is_authenticated() => {
                self.fail(target, FailureCode::Unauthenticated)
            }
            Some(_) => self,
        }
    }

    /// The ID token must be present and non-blank.
    pub fn id_token(&mut self, value: Option<&str>, target: Target) -> &mut Self {
        self.string(value, target).not_blank().done()
    }
}

fn is_base64url(value: &str) -> bool {
    value.len() % 4 != 1
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{Claim, ClaimsIdentity, claim_types};
    use crate::scopes::StaticScopesProvider;
    use crate::state::AuthorizationStateFactory;
    use crate::storage::InMemorySecurityRepository;
    use crate::trust::AllowListDomainResolver;
    use crate::AuthError;
    use async_trait::async_trait;

    const FIELD: Target = Target::new("Command", "field");

    struct FailingRepository;

    #[async_trait]
    impl SecurityRepository for FailingRepository {
        async fn find_client_secret_identity(
            &self,
            _client_id: &str,
        ) -> AuthResult<Option<ClientSecretIdentity>> {
            Err(AuthError::storage("connection refused"))
        }
    }

    fn repository() -> InMemorySecurityRepository {
        [ClientSecretIdentity::new("client-1", "s3cret", "Client One")]
            .into_iter()
            .collect()
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_response_type() {
        let pattern = Regex::new("^code$").unwrap();
        let mut validator = Validator::new();
        validator.response_type(Some("code"), &pattern, FIELD);
        assert!(validator.is_valid());

        validator.response_type(Some("token"), &pattern, FIELD);
        validator.response_type(None, &pattern, FIELD);
        let errors = validator.finish().unwrap_err();
        assert!(errors.contains(FailureCode::PatternMismatch, "field"));
        assert!(errors.contains(FailureCode::Required, "field"));
    }

    #[tokio::test]
    async fn test_client_id_resolves() {
        let repository = repository();
        let mut validator = Validator::new();

        let client = validator
            .client_id(Some("client-1"), &repository, FIELD)
            .await
            .unwrap();
        assert_eq!(client.map(|c| c.name), Some("Client One".to_string()));
        assert!(validator.is_valid());

        let client = validator
            .client_id(Some("client-2"), &repository, FIELD)
            .await
            .unwrap();
        assert!(client.is_none());
        let errors = validator.finish().unwrap_err();
        assert!(errors.contains(FailureCode::UnknownClient, "field"));
    }

    #[tokio::test]
    async fn test_client_id_blank_skips_lookup() {
        let mut validator = Validator::new();
        let client = validator
            .client_id(Some("  "), &FailingRepository, FIELD)
            .await
            .unwrap();
        assert!(client.is_none());
        assert!(validator.finish().unwrap_err().contains(FailureCode::Blank, "field"));
    }

    #[tokio::test]
    async fn test_client_id_propagates_repository_failure() {
        let mut validator = Validator::new();
        let err = validator
            .client_id(Some("client-1"), &FailingRepository, FIELD)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Storage { .. }));
    }

    #[test]
    fn test_redirect_uri() {
        let resolver = AllowListDomainResolver::new(["app.example"]);
        let mut validator = Validator::new();

        validator.redirect_uri(Some("https://app.example/callback"), &resolver, FIELD);
        assert!(validator.is_valid());

        let untrusted = Target::new("C", "untrusted");
        validator
            .redirect_uri(Some("https://evil.example/callback"), &resolver, untrusted)
            .redirect_uri(Some("/callback"), &resolver, Target::new("C", "relative"))
            .redirect_uri(None, &resolver, Target::new("C", "missing"));

        let errors = validator.finish().unwrap_err();
        assert!(errors.contains(FailureCode::UntrustedDomain, "untrusted"));
        assert!(errors.contains(FailureCode::InvalidUri, "relative"));
        assert!(errors.contains(FailureCode::Required, "missing"));
    }

    #[test]
    fn test_scopes_containment() {
        let provider = StaticScopesProvider::from_names(["openid", "profile", "email"]);
        let mut validator = Validator::new();

        let requested = names(&["profile", "email"]);
        validator.scopes(Some(requested.as_slice()), &provider, FIELD);
        assert!(validator.is_valid());

        let requested = names(&["profile", "admin"]);
        validator.scopes(Some(requested.as_slice()), &provider, FIELD);
        let errors = validator.finish().unwrap_err();
        assert_eq!(errors.len(), 1);
        let failure = errors.iter().next().unwrap();
        assert_eq!(failure.code, FailureCode::UnsupportedScope);
        assert_eq!(failure.detail.as_deref(), Some("admin"));
    }

    #[test]
    fn test_scopes_count_bounds() {
        let provider = StaticScopesProvider::from_names(["openid", "profile"]);
        let many = names(&["openid", "profile", "email"]);
        let empty: Vec<String> = Vec::new();
        let mut validator = Validator::new();

        validator
            .scopes(Some(many.as_slice()), &provider, Target::new("C", "many"))
            .scopes(Some(empty.as_slice()), &provider, Target::new("C", "empty"))
            .scopes(None, &provider, Target::new("C", "missing"));

        let errors = validator.finish().unwrap_err();
        assert!(errors.contains(FailureCode::TooManyItems, "many"));
        assert!(errors.contains(FailureCode::TooFewItems, "empty"));
        assert!(errors.contains(FailureCode::Required, "missing"));
    }

    #[test]
    fn test_external_state_and_nonce() {
        let mut validator = Validator::new();
        validator
            .external_state(None, FIELD, true)
            .nonce(Some("n-0S6"), FIELD, true);
        assert!(validator.is_valid());

        validator
            .external_state(Some(""), Target::new("C", "state"), true)
            .nonce(None, Target::new("C", "nonce"), false);
        let errors = validator.finish().unwrap_err();
        assert!(errors.contains(FailureCode::MinLength, "state"));
        assert!(errors.contains(FailureCode::Required, "nonce"));
    }

    #[test]
    fn test_sealed_state_structure() {
        let mut validator = Validator::new();
        validator.sealed_state(Some("abcd-_09"), 64, FIELD);
        assert!(validator.is_valid());

        validator
            .sealed_state(Some("abc+/="), 64, Target::new("C", "alphabet"))
            .sealed_state(Some("abcde"), 64, Target::new("C", "length"))
            .sealed_state(Some(&"a".repeat(65)), 64, Target::new("C", "long"));
        let errors = validator.finish().unwrap_err();
        assert!(errors.contains(FailureCode::MalformedState, "alphabet"));
        assert!(errors.contains(FailureCode::MalformedState, "length"));
        assert!(errors.contains(FailureCode::MaxLength, "long"));
    }

    #[tokio::test]
    async fn test_authorization_state_rechecks_live_data() {
        let state = AuthorizationStateFactory::default()
            .create(
                "code",
                "client-1",
                "https://app.example/callback",
                &names(&["profile", "email"]),
            )
            .unwrap()
            .build();
        let repository = repository();
        let resolver = AllowListDomainResolver::new(["app.example"]);
        let provider = StaticScopesProvider::from_names(["profile", "email"]);

        let mut validator = Validator::new();
        let client = validator
            .authorization_state(&state, &repository, &resolver, &provider)
            .await
            .unwrap();
        assert!(client.is_some());
        assert!(validator.is_valid());

        repository.remove("client-1");
        resolver.remove_domain("app.example");
        provider.replace([("profile".to_string(), Default::default())]);

        let mut validator = Validator::new();
        validator
            .authorization_state(&state, &repository, &resolver, &provider)
            .await
            .unwrap();
        let errors = validator.finish().unwrap_err();
        assert!(errors.contains(FailureCode::UnknownClient, "client_id"));
        assert!(errors.contains(FailureCode::UntrustedDomain, "redirect_uri"));
        assert!(errors.contains(FailureCode::TooManyItems, "scopes"));
    }

    #[test]
    fn test_claims_and_id_token() {
        let authenticated = ClaimsPrincipal::new(ClaimsIdentity::authenticated(
            "oidc",
            vec![Claim::new(claim_types::NAME_IDENTIFIER, "user-1")],
        ));
        let mut validator = Validator::new();
        validator
            .claims(Some(&authenticated), FIELD)
            .id_token(Some("header.payload.sig"), FIELD);
        assert!(validator.is_valid());

        validator
            .claims(Some(&ClaimsPrincipal::anonymous()), Target::new("C", "anonymous"))
            .claims(None, Target::new("C", "missing"))
            .id_token(Some(" "), Target::new("C", "id_token"));
        let errors = validator.finish().unwrap_err();
        assert!(errors.contains(FailureCode::Unauthenticated, "anonymous"));
        assert!(errors.contains(FailureCode::Required, "missing"));
        assert!(errors.contains(FailureCode::Blank, "id_token"));
    }
}
