//! One-time consumption of authorization codes.
//!
//! A sealed authorization code is self-contained, so nothing in the code
//! itself stops it from being replayed. The exchange step records each
//! redeemed code identifier here and refuses identifiers it has seen before.
//!
//! # Security Considerations
//!
//! - `consume` must be atomic; two concurrent exchanges of the same code
//!   must not both succeed
//! - Entries only need to live until the code expires
//! - Multi-instance deployments need a shared backend

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::AuthResult;

/// Storage trait for single-use authorization codes.
#[async_trait]
pub trait CodeConsumptionStore: Send + Sync {
    /// Atomically marks a code identifier as redeemed if not already redeemed.
    ///
    /// # Arguments
    ///
    /// * `code_id` - The code identifier bound at issuance
    /// * `expires_at` - When the entry can be cleaned up (matches code expiry)
    ///
    /// # Returns
    ///
    /// Returns `true` on first redemption, `false` if the code was already
    /// redeemed (replay).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume(&self, code_id: &str, expires_at: OffsetDateTime) -> AuthResult<bool>;

    /// Deletes entries whose codes have expired.
    ///
    /// # Returns
    ///
    /// Returns the number of entries deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}

/// Concurrent in-memory consumption store.
#[derive(Debug, Default)]
pub struct InMemoryCodeConsumptionStore {
    consumed: DashMap<String, OffsetDateTime>,
}

impl InMemoryCodeConsumptionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tracked codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    /// Returns `true` if no codes are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}

#[async_trait]
impl CodeConsumptionStore for InMemoryCodeConsumptionStore {
    async fn consume(&self, code_id: &str, expires_at: OffsetDateTime) -> AuthResult<bool> {
        match self.consumed.entry(code_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.consumed.len();
        self.consumed.retain(|_, expires_at| *expires_at > now);
        Ok(before.saturating_sub(self.consumed.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::Duration;

    #[tokio::test]
    async fn test_consume_once() {
        let store = InMemoryCodeConsumptionStore::new();
        let expires_at = OffsetDateTime::now_utc() + Duration::minutes(10);

        assert!(store.consume("code-1", expires_at).await.unwrap());
        assert!(!store.consume("code-1", expires_at).await.unwrap());
        assert!(store.consume("code-2", expires_at).await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_consume_has_single_winner() {
        let store = Arc::new(InMemoryCodeConsumptionStore::new());
        let expires_at = OffsetDateTime::now_utc() + Duration::minutes(10);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.consume("shared", expires_at).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = InMemoryCodeConsumptionStore::new();
        let now = OffsetDateTime::now_utc();

        store.consume("old", now - Duration::minutes(1)).await.unwrap();
        store.consume("fresh", now + Duration::minutes(10)).await.unwrap();

        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(!store.consume("fresh", now).await.unwrap());
    }
}
