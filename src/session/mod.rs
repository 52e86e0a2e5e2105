//! Server-side refresh-session store.
//!
//! Refresh tokens are opaque to the store: only a SHA-256 hash of the raw
//! token is persisted, and a session row is the sole authority for whether a
//! refresh token may be exchanged. One active session per user; creating a
//! new one rotates out whatever was there before.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::errors::AuthError;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

/// One refresh session. `token_hash` is hex-encoded SHA-256 of the raw
/// refresh token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshSession {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Hash a raw refresh token for storage or lookup. Raw tokens never touch
/// the store.
#[must_use]
pub fn hash_refresh_token(raw_token: &str) -> String {
    let digest = Sha256::digest(raw_token.as_bytes());
    format!("{digest:x}")
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session for `session.user_id`, replacing any existing
    /// session for that user (rotation).
    async fn create(&self, session: RefreshSession) -> Result<(), AuthError>;

    /// Look up a session by token hash regardless of validity.
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>, AuthError>;

    /// Exchange a presented refresh token hash for its session, consuming
    /// the row: of any concurrent exchanges of the same token, at most one
    /// succeeds. An expired match is reported as [`AuthError::Expired`];
    /// a miss (including a replay) is [`AuthError::NotFound`].
    async fn take_valid(&self, token_hash: &str) -> Result<RefreshSession, AuthError>;

    /// Delete the session matching the hash, if any. Idempotent.
    async fn revoke(&self, token_hash: &str) -> Result<(), AuthError>;

    /// Delete every session belonging to the user. Returns how many were
    /// removed.
    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError>;

    /// Delete expired rows. Returns how many were removed.
    async fn sweep_expired(&self) -> Result<u64, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256_and_deterministic() {
        let hash = hash_refresh_token("token");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(hash, hash_refresh_token("token"));
        assert_ne!(hash, hash_refresh_token("other"));
    }

    #[test]
    fn expiry_check_is_inclusive() {
        let now = Utc::now();
        let session = RefreshSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            email: "alice@example.com".into(),
            token_hash: hash_refresh_token("t"),
            created_at: now,
            expires_at: now,
        };
        assert!(session.is_expired_at(now));
        assert!(!session.is_expired_at(now - chrono::Duration::seconds(1)));
    }
}
