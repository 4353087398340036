//! Collaborators shared by the flow commands.

use std::sync::Arc;

use regex::Regex;

use crate::config::{CodeFlowConfig, ConfigError};
use crate::scopes::SupportedScopesProvider;
use crate::state::AuthorizationStateFactory;
use crate::storage::SecurityRepository;
use crate::trust::TrustedDomainResolver;

/// Default upper bound for sealed state and code strings.
pub const DEFAULT_MAX_SEALED_LENGTH: usize = 4096;

/// Everything a command needs besides its own input.
///
/// Cloning is cheap; collaborators are shared.
#[derive(Clone)]
pub struct FlowContext {
    /// Creates and (un)seals states.
    pub factory: AuthorizationStateFactory,

    /// Registered client lookup.
    pub repository: Arc<dyn SecurityRepository>,

    /// Redirect allow-list.
    pub trusted_domains: Arc<dyn TrustedDomainResolver>,

    /// Supported scope registry.
    pub scopes: Arc<dyn SupportedScopesProvider>,

    /// Pattern `response_type` must match.
    pub response_type_pattern: Regex,

    /// Upper bound for sealed strings accepted from the outside.
    pub max_sealed_length: usize,
}

impl FlowContext {
    /// Creates a context with default factory, `^code$` response type and
    /// default sealed length bound.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the default pattern fails to
    /// compile, which does not happen in practice.
    pub fn new(
        repository: Arc<dyn SecurityRepository>,
        trusted_domains: Arc<dyn TrustedDomainResolver>,
        scopes: Arc<dyn SupportedScopesProvider>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            factory: AuthorizationStateFactory::default(),
            repository,
            trusted_domains,
            scopes,
            response_type_pattern: CodeFlowConfig::default().response_type_regex()?,
            max_sealed_length: DEFAULT_MAX_SEALED_LENGTH,
        })
    }

    /// Builds a context from configuration.
    ///
    /// The allow-list and scope registry are created from `config`; the
    /// client repository is supplied by the host.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn from_config(
        config: &CodeFlowConfig,
        repository: Arc<dyn SecurityRepository>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            factory: config.state_factory(),
            repository,
            trusted_domains: Arc::new(config.trusted_domain_resolver()),
            scopes: Arc::new(config.supported_scopes_provider()),
            response_type_pattern: config.response_type_regex()?,
            max_sealed_length: config.max_sealed_length,
        })
    }

    /// Replaces the state factory.
    #[must_use]
    pub fn with_factory(mut self, factory: AuthorizationStateFactory) -> Self {
        self.factory = factory;
        self
    }
}
