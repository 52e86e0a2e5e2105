//! Persistent two-factor state per user.
//!
//! A profile tracks a pending (unconfirmed) encrypted secret, the active
//! encrypted secret once enrollment is confirmed, and the remaining
//! Argon2id hashes of unused recovery codes. Invariant: `enabled` implies an
//! active secret is present.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AuthError;

pub use memory::MemoryTwoFactorStore;
pub use postgres::PgTwoFactorStore;

/// The second factor an account requires. TOTP is the only method today;
/// the discriminator is part of the login contract so clients can dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorMethod {
    #[default]
    Totp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TwoFactorProfile {
    pub user_id: Uuid,
    pub enabled: bool,
    /// Secret awaiting a confirming TOTP code; replaced by each setup start.
    pub pending_secret_enc: Option<Vec<u8>>,
    /// Active secret once enrollment is confirmed.
    pub secret_enc: Option<Vec<u8>>,
    /// Hashes of unused recovery codes; consumed entries are removed.
    pub recovery_hashes: Vec<String>,
    pub enabled_at: Option<DateTime<Utc>>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TwoFactorProfile {
    #[must_use]
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            enabled: false,
            pending_secret_enc: None,
            secret_enc: None,
            recovery_hashes: Vec::new(),
            enabled_at: None,
            last_verified_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Promote the pending secret to active and enable the factor.
    ///
    /// # Errors
    /// Returns [`AuthError::NotConfigured`] when no secret is pending.
    pub fn confirm_pending(&mut self) -> Result<(), AuthError> {
        let Some(secret) = self.pending_secret_enc.take() else {
            return Err(AuthError::NotConfigured);
        };
        self.secret_enc = Some(secret);
        self.enabled = true;
        self.enabled_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a successful second-factor verification.
    pub fn mark_verified(&mut self) {
        self.last_verified_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Clear all two-factor state, returning the profile to its disabled
    /// shape.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.pending_secret_enc = None;
        self.secret_enc = None;
        self.recovery_hashes.clear();
        self.enabled_at = None;
        self.last_verified_at = None;
        self.updated_at = Utc::now();
    }

    /// Remove a consumed recovery-code hash by index.
    pub fn consume_recovery_hash(&mut self, index: usize) {
        if index < self.recovery_hashes.len() {
            self.recovery_hashes.remove(index);
            self.updated_at = Utc::now();
        }
    }
}

#[async_trait]
pub trait TwoFactorStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<TwoFactorProfile>, AuthError>;

    /// Insert or fully replace the profile for `profile.user_id`.
    async fn upsert(&self, profile: TwoFactorProfile) -> Result<(), AuthError>;

    async fn delete(&self, user_id: Uuid) -> Result<(), AuthError>;
}
