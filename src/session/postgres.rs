//! Postgres-backed session store. Schema lives in `db/sql/01_custos.sql`.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{RefreshSession, SessionStore};
use crate::errors::AuthError;

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> RefreshSession {
    RefreshSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        email: row.get("email"),
        token_hash: row.get("token_hash"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: RefreshSession) -> Result<(), AuthError> {
        // Rotation: drop the user's previous session in the same transaction
        // so there is never a window with two live refresh tokens.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin session rotation transaction")?;

        let query = "DELETE FROM refresh_sessions WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session.user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete previous session")?;

        let query = r"
            INSERT INTO refresh_sessions
                (id, user_id, email, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session.id)
            .bind(session.user_id)
            .bind(&session.email)
            .bind(&session.token_hash)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert session")?;

        tx.commit()
            .await
            .context("commit session rotation transaction")?;
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>, AuthError> {
        let query = r"
            SELECT id, user_id, email, token_hash, created_at, expires_at
            FROM refresh_sessions
            WHERE token_hash = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn take_valid(&self, token_hash: &str) -> Result<RefreshSession, AuthError> {
        // DELETE .. RETURNING consumes the row atomically: concurrent
        // exchanges of the same token see at most one winner.
        let query = r"
            DELETE FROM refresh_sessions
            WHERE token_hash = $1
            RETURNING id, user_id, email, token_hash, created_at, expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume session")?;

        let Some(session) = row.as_ref().map(row_to_session) else {
            return Err(AuthError::NotFound);
        };
        if session.is_expired_at(Utc::now()) {
            return Err(AuthError::Expired);
        }
        Ok(session)
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), AuthError> {
        // Idempotent; zero deleted rows is fine.
        let query = "DELETE FROM refresh_sessions WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let query = "DELETE FROM refresh_sessions WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete user sessions")?;
        Ok(result.rows_affected())
    }

    async fn sweep_expired(&self) -> Result<u64, AuthError> {
        let query = "DELETE FROM refresh_sessions WHERE expires_at <= NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to sweep expired sessions")?;
        Ok(result.rows_affected())
    }
}
