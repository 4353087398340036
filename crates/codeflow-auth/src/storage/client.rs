//! Client secret repository.
//!
//! Defines the read-only lookup the flow performs against the durable client
//! registry. Persistence itself belongs to the host; an in-memory
//! implementation is provided for tests and single-process deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::AuthResult;

// =============================================================================
// Client Secret Identity
// =============================================================================

/// A registered confidential client.
///
/// Owned by the repository; the flow never mutates it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSecretIdentity {
    /// OAuth client identifier.
    pub client_id: String,

    /// Shared client secret.
    pub client_secret: String,

    /// Human-readable display name.
    pub name: String,
}

impl ClientSecretIdentity {
    /// Creates a new client identity.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Debug for ClientSecretIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretIdentity")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

// =============================================================================
// Security Repository Trait
// =============================================================================

/// Lookup of registered clients.
///
/// # Example
///
/// ```ignore
/// use codeflow_auth::storage::SecurityRepository;
///
/// async fn example(repository: &impl SecurityRepository) {
///     if let Some(client) = repository.find_client_secret_identity("my-app").await? {
///         println!("Found client: {}", client.name);
///     }
/// }
/// ```
#[async_trait]
pub trait SecurityRepository: Send + Sync {
    /// Finds a client by its OAuth client_id.
    ///
    /// Returns `None` if the client is not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails. Transient failures are
    /// propagated to the caller unchanged; the flow never retries.
    async fn find_client_secret_identity(
        &self,
        client_id: &str,
    ) -> AuthResult<Option<ClientSecretIdentity>>;
}

// =============================================================================
// In-Memory Repository
// =============================================================================

/// Concurrent in-memory client registry.
#[derive(Debug, Default)]
pub struct InMemorySecurityRepository {
    clients: DashMap<String, ClientSecretIdentity>,
}

impl InMemorySecurityRepository {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a client.
    pub fn insert(&self, client: ClientSecretIdentity) {
        self.clients.insert(client.client_id.clone(), client);
    }

    /// Removes a client, returning it if it was registered.
    pub fn remove(&self, client_id: &str) -> Option<ClientSecretIdentity> {
        self.clients.remove(client_id).map(|(_, client)| client)
    }
}

impl FromIterator<ClientSecretIdentity> for InMemorySecurityRepository {
    fn from_iter<I: IntoIterator<Item = ClientSecretIdentity>>(iter: I) -> Self {
        let repository = Self::new();
        for client in iter {
            repository.insert(client);
        }
        repository
    }
}

#[async_trait]
impl SecurityRepository for InMemorySecurityRepository {
    async fn find_client_secret_identity(
        &self,
        client_id: &str,
    ) -> AuthResult<Option<ClientSecretIdentity>> {
        Ok(self.clients.get(client_id).map(|entry| entry.value().clone()))
    }
}
