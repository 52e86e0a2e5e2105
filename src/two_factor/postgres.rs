//! Postgres-backed two-factor store. Schema lives in `db/sql/01_custos.sql`.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{TwoFactorProfile, TwoFactorStore};
use crate::errors::AuthError;

#[derive(Clone, Debug)]
pub struct PgTwoFactorStore {
    pool: PgPool,
}

impl PgTwoFactorStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TwoFactorStore for PgTwoFactorStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<TwoFactorProfile>, AuthError> {
        let query = r"
            SELECT user_id, enabled, pending_secret_enc, secret_enc,
                   recovery_hashes, enabled_at, last_verified_at, updated_at
            FROM two_factor_profiles
            WHERE user_id = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup two-factor profile")?;

        Ok(row.map(|row| TwoFactorProfile {
            user_id: row.get("user_id"),
            enabled: row.get("enabled"),
            pending_secret_enc: row.get("pending_secret_enc"),
            secret_enc: row.get("secret_enc"),
            recovery_hashes: row.get("recovery_hashes"),
            enabled_at: row.get("enabled_at"),
            last_verified_at: row.get("last_verified_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn upsert(&self, profile: TwoFactorProfile) -> Result<(), AuthError> {
        let query = r"
            INSERT INTO two_factor_profiles
                (user_id, enabled, pending_secret_enc, secret_enc,
                 recovery_hashes, enabled_at, last_verified_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                pending_secret_enc = EXCLUDED.pending_secret_enc,
                secret_enc = EXCLUDED.secret_enc,
                recovery_hashes = EXCLUDED.recovery_hashes,
                enabled_at = EXCLUDED.enabled_at,
                last_verified_at = EXCLUDED.last_verified_at,
                updated_at = EXCLUDED.updated_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(profile.user_id)
            .bind(profile.enabled)
            .bind(profile.pending_secret_enc)
            .bind(profile.secret_enc)
            .bind(&profile.recovery_hashes)
            .bind(profile.enabled_at)
            .bind(profile.last_verified_at)
            .bind(profile.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert two-factor profile")?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), AuthError> {
        // Idempotent; zero deleted rows is fine.
        let query = "DELETE FROM two_factor_profiles WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete two-factor profile")?;
        Ok(())
    }
}
