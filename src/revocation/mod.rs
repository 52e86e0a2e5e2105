//! Token revocation registry.
//!
//! Two kinds of entry: per-token blacklist rows keyed by `jti` and kept for
//! the remainder of the token's lifetime, and owner-wide markers that reject
//! every token issued at or before the marker's timestamp. Callers treat the
//! registry fail-closed: an error from any check means the token is refused.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AuthError;

/// Registry occupancy, exposed on the admin surface.
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq, ToSchema)]
pub struct RegistryStats {
    pub token_entries: usize,
    pub owner_markers: usize,
}

#[async_trait]
pub trait RevocationRegistry: Send + Sync {
    /// Blacklist a single token id until `expires_at`, after which the entry
    /// is useless (the token would be rejected as expired anyway).
    async fn revoke_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError>;

    /// Mark an owner so every token issued at or before `revoked_at` is
    /// rejected. `expires_at` bounds the marker to the longest token
    /// lifetime in flight.
    async fn revoke_owner(
        &self,
        owner: Uuid,
        revoked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Whether a token is revoked, either directly by id or via an owner
    /// marker covering its issue time.
    async fn is_revoked(
        &self,
        jti: &str,
        owner: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Drop a token-level blacklist entry (administrative correction).
    /// Owner markers are unaffected.
    async fn unrevoke_token(&self, jti: &str) -> Result<(), AuthError>;

    async fn stats(&self) -> Result<RegistryStats, AuthError>;
}

struct OwnerMarker {
    revoked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Process-local registry backed by two maps. Expired entries are purged on
/// every write and check.
#[derive(Default)]
pub struct MemoryRevocationRegistry {
    tokens: Mutex<HashMap<String, DateTime<Utc>>>,
    owners: Mutex<HashMap<Uuid, OwnerMarker>>,
}

impl MemoryRevocationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn revoke_token_at(
        &self,
        jti: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| AuthError::Internal(anyhow!("revocation registry lock poisoned")))?;
        tokens.retain(|_, expiry| *expiry > now);
        if expires_at > now {
            tokens.insert(jti.to_owned(), expires_at);
        }
        Ok(())
    }

    fn revoke_owner_at(
        &self,
        owner: Uuid,
        revoked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut owners = self
            .owners
            .lock()
            .map_err(|_| AuthError::Internal(anyhow!("revocation registry lock poisoned")))?;
        owners.retain(|_, marker| marker.expires_at > now);
        owners.insert(
            owner,
            OwnerMarker {
                revoked_at,
                expires_at,
            },
        );
        Ok(())
    }

    fn is_revoked_at(
        &self,
        jti: &str,
        owner: Uuid,
        issued_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        {
            let mut tokens = self
                .tokens
                .lock()
                .map_err(|_| AuthError::Internal(anyhow!("revocation registry lock poisoned")))?;
            tokens.retain(|_, expiry| *expiry > now);
            if tokens.contains_key(jti) {
                return Ok(true);
            }
        }

        let mut owners = self
            .owners
            .lock()
            .map_err(|_| AuthError::Internal(anyhow!("revocation registry lock poisoned")))?;
        owners.retain(|_, marker| marker.expires_at > now);
        Ok(owners
            .get(&owner)
            .is_some_and(|marker| issued_at <= marker.revoked_at))
    }

    fn stats_at(&self, now: DateTime<Utc>) -> Result<RegistryStats, AuthError> {
        let token_entries = {
            let mut tokens = self
                .tokens
                .lock()
                .map_err(|_| AuthError::Internal(anyhow!("revocation registry lock poisoned")))?;
            tokens.retain(|_, expiry| *expiry > now);
            tokens.len()
        };
        let owner_markers = {
            let mut owners = self
                .owners
                .lock()
                .map_err(|_| AuthError::Internal(anyhow!("revocation registry lock poisoned")))?;
            owners.retain(|_, marker| marker.expires_at > now);
            owners.len()
        };
        Ok(RegistryStats {
            token_entries,
            owner_markers,
        })
    }
}

#[async_trait]
impl RevocationRegistry for MemoryRevocationRegistry {
    async fn revoke_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        self.revoke_token_at(jti, expires_at, Utc::now())
    }

    async fn revoke_owner(
        &self,
        owner: Uuid,
        revoked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.revoke_owner_at(owner, revoked_at, expires_at, Utc::now())
    }

    async fn is_revoked(
        &self,
        jti: &str,
        owner: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        self.is_revoked_at(jti, owner, issued_at, Utc::now())
    }

    async fn unrevoke_token(&self, jti: &str) -> Result<(), AuthError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| AuthError::Internal(anyhow!("revocation registry lock poisoned")))?;
        tokens.remove(jti);
        Ok(())
    }

    async fn stats(&self) -> Result<RegistryStats, AuthError> {
        self.stats_at(Utc::now())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn blacklisted_token_is_revoked_until_expiry() {
        let registry = MemoryRevocationRegistry::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();

        registry
            .revoke_token_at("jti-1", now + Duration::minutes(15), now)
            .unwrap();

        assert!(registry.is_revoked_at("jti-1", owner, now, now).unwrap());
        assert!(!registry.is_revoked_at("jti-2", owner, now, now).unwrap());

        // Entry is purged once the token would have expired anyway.
        let later = now + Duration::minutes(16);
        assert!(!registry.is_revoked_at("jti-1", owner, now, later).unwrap());
    }

    #[tokio::test]
    async fn unrevoke_clears_a_token_entry_but_not_owner_markers() {
        let registry = MemoryRevocationRegistry::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();

        registry
            .revoke_token_at("jti-1", now + Duration::minutes(15), now)
            .unwrap();
        registry
            .revoke_owner_at(owner, now, now + Duration::days(7), now)
            .unwrap();

        registry.unrevoke_token("jti-1").await.unwrap();

        assert!(!registry
            .is_revoked_at("jti-1", Uuid::new_v4(), now, now)
            .unwrap());
        // Issued before the marker, still rejected via the owner path.
        assert!(registry
            .is_revoked_at("jti-1", owner, now - Duration::minutes(1), now)
            .unwrap());
    }

    #[test]
    fn owner_marker_rejects_previously_issued_tokens_only() {
        let registry = MemoryRevocationRegistry::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();

        registry
            .revoke_owner_at(owner, now, now + Duration::days(7), now)
            .unwrap();

        let issued_before = now - Duration::minutes(5);
        let issued_after = now + Duration::seconds(1);
        assert!(registry
            .is_revoked_at("any-jti", owner, issued_before, now)
            .unwrap());
        assert!(!registry
            .is_revoked_at("new-jti", owner, issued_after, now)
            .unwrap());

        // Other owners are unaffected.
        assert!(!registry
            .is_revoked_at("any-jti", Uuid::new_v4(), issued_before, now)
            .unwrap());
    }

    #[test]
    fn owner_marker_expires_with_longest_token_lifetime() {
        let registry = MemoryRevocationRegistry::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();

        registry
            .revoke_owner_at(owner, now, now + Duration::days(7), now)
            .unwrap();

        let after_expiry = now + Duration::days(8);
        assert!(!registry
            .is_revoked_at("jti", owner, now - Duration::minutes(1), after_expiry)
            .unwrap());
    }

    #[test]
    fn stats_count_live_entries() {
        let registry = MemoryRevocationRegistry::new();
        let now = Utc::now();

        registry
            .revoke_token_at("a", now + Duration::minutes(1), now)
            .unwrap();
        registry
            .revoke_token_at("b", now + Duration::minutes(2), now)
            .unwrap();
        registry
            .revoke_owner_at(Uuid::new_v4(), now, now + Duration::days(7), now)
            .unwrap();

        let stats = registry.stats_at(now).unwrap();
        assert_eq!(stats.token_entries, 2);
        assert_eq!(stats.owner_markers, 1);

        let later = now + Duration::minutes(90);
        let stats = registry.stats_at(later).unwrap();
        assert_eq!(stats.token_entries, 0);
        assert_eq!(stats.owner_markers, 1);
    }
}
