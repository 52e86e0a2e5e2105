//! In-memory two-factor store for tests and single-node deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use uuid::Uuid;

use super::{TwoFactorProfile, TwoFactorStore};
use crate::errors::AuthError;

#[derive(Default)]
pub struct MemoryTwoFactorStore {
    profiles: Mutex<HashMap<Uuid, TwoFactorProfile>>,
}

impl MemoryTwoFactorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TwoFactorStore for MemoryTwoFactorStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<TwoFactorProfile>, AuthError> {
        let profiles = self
            .profiles
            .lock()
            .map_err(|_| AuthError::Internal(anyhow!("two-factor store lock poisoned")))?;
        Ok(profiles.get(&user_id).cloned())
    }

    async fn upsert(&self, profile: TwoFactorProfile) -> Result<(), AuthError> {
        let mut profiles = self
            .profiles
            .lock()
            .map_err(|_| AuthError::Internal(anyhow!("two-factor store lock poisoned")))?;
        profiles.insert(profile.user_id, profile);
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), AuthError> {
        let mut profiles = self
            .profiles
            .lock()
            .map_err(|_| AuthError::Internal(anyhow!("two-factor store lock poisoned")))?;
        profiles.remove(&user_id);
        Ok(())
    }
}
