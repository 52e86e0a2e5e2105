//! In-memory session store for tests and single-node deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{RefreshSession, SessionStore};
use crate::errors::AuthError;

#[derive(Default)]
pub struct MemorySessionStore {
    // Keyed by token hash.
    sessions: Mutex<HashMap<String, RefreshSession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, RefreshSession>>, AuthError> {
        self.sessions
            .lock()
            .map_err(|_| AuthError::Internal(anyhow!("session store lock poisoned")))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: RefreshSession) -> Result<(), AuthError> {
        let mut sessions = self.lock()?;
        sessions.retain(|_, existing| existing.user_id != session.user_id);
        sessions.insert(session.token_hash.clone(), session);
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>, AuthError> {
        Ok(self.lock()?.get(token_hash).cloned())
    }

    async fn take_valid(&self, token_hash: &str) -> Result<RefreshSession, AuthError> {
        let mut sessions = self.lock()?;
        // Removed under the lock so a token can only be exchanged once.
        let Some(session) = sessions.remove(token_hash) else {
            return Err(AuthError::NotFound);
        };
        if session.is_expired_at(Utc::now()) {
            return Err(AuthError::Expired);
        }
        Ok(session)
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), AuthError> {
        self.lock()?.remove(token_hash);
        Ok(())
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn sweep_expired(&self) -> Result<u64, AuthError> {
        let now = Utc::now();
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - sessions.len()) as u64)
    }
}
