//! Authentication orchestrator.
//!
//! Glues the signing codec, the TOTP engine, the session store, the
//! revocation registry, and the external identity provider into the
//! operations the HTTP surface exposes: login (with optional two-factor
//! bifurcation), refresh rotation, logout, owner-wide revocation, and
//! per-request authentication.

pub mod config;
pub mod two_factor;

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditRecord, AuditSink};
use crate::errors::AuthError;
use crate::identity::IdentityProvider;
use crate::rate_limit::RateLimiter;
use crate::revocation::{RegistryStats, RevocationRegistry};
use crate::session::{hash_refresh_token, RefreshSession, SessionStore};
use crate::token::{AccessClaims, TokenSigner};
use crate::totp::crypto::SecretCipher;
use crate::totp::TotpEngine;
use crate::two_factor::{TwoFactorMethod, TwoFactorStore};

pub use config::AuthConfig;

/// Role required for the admin surface.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Access + refresh tokens issued together.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

/// Result of primary authentication: either a full token pair, or an
/// intermediate token when the account still owes a second factor.
#[derive(Clone, Debug)]
pub enum LoginOutcome {
    Tokens(TokenPair),
    TwoFactorRequired {
        intermediate_token: String,
        method: TwoFactorMethod,
        expires_in: i64,
    },
}

/// Persistence seams the orchestrator works against.
pub struct AuthnStores {
    pub sessions: Arc<dyn SessionStore>,
    pub revocations: Arc<dyn RevocationRegistry>,
    pub two_factor: Arc<dyn TwoFactorStore>,
}

pub struct Authenticator {
    config: AuthConfig,
    signer: TokenSigner,
    totp: TotpEngine,
    cipher: SecretCipher,
    recovery_pepper: Vec<u8>,
    identity: Arc<dyn IdentityProvider>,
    rate_limiter: Arc<dyn RateLimiter>,
    audit: Arc<dyn AuditSink>,
    stores: AuthnStores,
}

impl Authenticator {
    /// # Errors
    /// Returns an error if the secret-encryption key has the wrong length.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AuthConfig,
        signing_key: &[u8],
        secret_encryption_key: &[u8],
        recovery_pepper: &[u8],
        identity: Arc<dyn IdentityProvider>,
        rate_limiter: Arc<dyn RateLimiter>,
        audit: Arc<dyn AuditSink>,
        stores: AuthnStores,
    ) -> Result<Self, AuthError> {
        let totp = TotpEngine::new(config.issuer().to_owned());
        Ok(Self {
            signer: TokenSigner::new(signing_key),
            totp,
            cipher: SecretCipher::new(secret_encryption_key)?,
            recovery_pepper: recovery_pepper.to_vec(),
            config,
            identity,
            rate_limiter,
            audit,
            stores,
        })
    }

    /// Exchange a primary credential for tokens, or for an intermediate
    /// token when the account has two-factor enabled.
    ///
    /// # Errors
    /// `AuthenticationFailed` for rejected credentials, `ServiceUnavailable`
    /// when the identity provider cannot answer.
    pub async fn login(
        &self,
        email: &str,
        password: &secrecy::SecretString,
    ) -> Result<LoginOutcome, AuthError> {
        let identity = match self.identity.verify_credentials(email, password).await {
            Ok(identity) => identity,
            Err(err) => {
                if matches!(err, AuthError::AuthenticationFailed) {
                    self.record(AuditEvent::LoginFailed {
                        email: email.to_owned(),
                    })
                    .await;
                }
                return Err(err);
            }
        };

        let profile = self.stores.two_factor.get(identity.user_id).await?;
        if profile.is_some_and(|profile| profile.enabled) {
            let (intermediate_token, _jti) = self.signer.issue_intermediate(
                &identity.email,
                identity.user_id,
                self.config.intermediate_ttl(),
            )?;
            info!(user_id = %identity.user_id, "login pending two-factor verification");
            self.record(AuditEvent::LoginRequiresTwoFactor {
                user_id: identity.user_id,
                email: identity.email,
            })
            .await;
            return Ok(LoginOutcome::TwoFactorRequired {
                intermediate_token,
                method: TwoFactorMethod::Totp,
                expires_in: self.config.intermediate_ttl_seconds(),
            });
        }

        let pair = self
            .issue_token_pair(&identity.email, identity.user_id, &identity.roles)
            .await?;
        self.record(AuditEvent::LoginSucceeded {
            user_id: identity.user_id,
            email: identity.email,
        })
        .await;
        Ok(LoginOutcome::Tokens(pair))
    }

    /// Rotate a refresh token: validate it against the session store and the
    /// revocation registry, re-fetch roles from the directory, then issue a
    /// fresh pair. The presented token's session row is replaced, so it can
    /// never be exchanged twice.
    ///
    /// # Errors
    /// `InvalidToken`/`Expired` for bad tokens, `NotFound` when no session
    /// backs the token, `Revoked` on a registry hit or registry outage.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.signer.verify_refresh(refresh_token)?;
        self.ensure_not_revoked(&claims.jti, claims.user_id, claims.iat)
            .await?;

        let token_hash = hash_refresh_token(refresh_token);
        let session = self.stores.sessions.take_valid(&token_hash).await?;

        // Roles come from the directory, not from the old token, so a
        // refresh picks up permission changes.
        let roles = self.identity.fetch_roles(&session.email).await?;
        let pair = self
            .issue_token_pair(&session.email, session.user_id, &roles)
            .await?;
        self.record(AuditEvent::TokenRefreshed {
            user_id: session.user_id,
        })
        .await;
        Ok(pair)
    }

    /// Invalidate the presented tokens: blacklist the access token for the
    /// rest of its lifetime and drop the refresh session. Idempotent on the
    /// session side.
    ///
    /// # Errors
    /// `InvalidToken`/`Expired` when the access token does not verify.
    pub async fn logout(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), AuthError> {
        let claims = self.signer.verify_access(access_token)?;
        let expires_at = timestamp(claims.exp)?;
        self.stores
            .revocations
            .revoke_token(&claims.jti, expires_at)
            .await?;

        if let Some(refresh_token) = refresh_token {
            // Best effort: a malformed refresh token must not block logout.
            if self.signer.verify_refresh(refresh_token).is_ok() {
                let token_hash = hash_refresh_token(refresh_token);
                self.stores.sessions.revoke(&token_hash).await?;
            }
        } else {
            self.stores.sessions.revoke_all(claims.user_id).await?;
        }

        self.record(AuditEvent::LoggedOut {
            user_id: claims.user_id,
        })
        .await;
        Ok(())
    }

    /// Revoke every token belonging to the caller: marks the owner in the
    /// registry (rejecting all tokens issued up to now) and drops all
    /// refresh sessions.
    ///
    /// # Errors
    /// Token and registry errors per [`Self::authenticate_request`].
    pub async fn revoke_all(&self, access_token: &str) -> Result<(), AuthError> {
        let claims = self.authenticate_request(access_token).await?;
        self.revoke_owner(claims.user_id).await?;
        self.record(AuditEvent::AllTokensRevoked {
            user_id: claims.user_id,
            by_admin: false,
        })
        .await;
        Ok(())
    }

    /// Admin: revoke every token belonging to another user.
    ///
    /// # Errors
    /// `AuthenticationFailed` when the caller lacks the admin role.
    pub async fn admin_revoke_user(
        &self,
        admin_access_token: &str,
        target_user: Uuid,
    ) -> Result<(), AuthError> {
        self.require_admin(admin_access_token).await?;
        self.revoke_owner(target_user).await?;
        self.record(AuditEvent::AllTokensRevoked {
            user_id: target_user,
            by_admin: true,
        })
        .await;
        Ok(())
    }

    /// Admin: lift a token-level blacklist entry that was applied in error.
    ///
    /// # Errors
    /// `AuthenticationFailed` when the caller lacks the admin role.
    pub async fn admin_unrevoke_token(
        &self,
        admin_access_token: &str,
        jti: &str,
    ) -> Result<(), AuthError> {
        self.require_admin(admin_access_token).await?;
        self.stores.revocations.unrevoke_token(jti).await
    }

    /// Admin: registry occupancy.
    ///
    /// # Errors
    /// `AuthenticationFailed` when the caller lacks the admin role.
    pub async fn admin_stats(&self, admin_access_token: &str) -> Result<RegistryStats, AuthError> {
        self.require_admin(admin_access_token).await?;
        self.stores.revocations.stats().await
    }

    /// Authenticate a bearer token for a protected request: signature,
    /// lifetime, and revocation registry, in that order. The registry is
    /// fail-closed: if it cannot answer, the token is treated as revoked.
    ///
    /// # Errors
    /// `InvalidToken`, `Expired`, or `Revoked`.
    pub async fn authenticate_request(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        let claims = self.signer.verify_access(access_token)?;
        self.ensure_not_revoked(&claims.jti, claims.user_id, claims.iat)
            .await?;
        Ok(claims)
    }

    async fn require_admin(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        let claims = self.authenticate_request(access_token).await?;
        if !claims.has_role(ADMIN_ROLE) {
            return Err(AuthError::AuthenticationFailed);
        }
        Ok(claims)
    }

    async fn revoke_owner(&self, user_id: Uuid) -> Result<(), AuthError> {
        let now = Utc::now();
        // The marker outlives the longest-lived token that could exist now.
        let expires_at = now + self.config.refresh_ttl();
        self.stores
            .revocations
            .revoke_owner(user_id, now, expires_at)
            .await?;
        self.stores.sessions.revoke_all(user_id).await?;
        Ok(())
    }

    async fn ensure_not_revoked(
        &self,
        jti: &str,
        user_id: Uuid,
        iat: i64,
    ) -> Result<(), AuthError> {
        let issued_at = timestamp(iat)?;
        match self
            .stores
            .revocations
            .is_revoked(jti, user_id, issued_at)
            .await
        {
            Ok(false) => Ok(()),
            Ok(true) => Err(AuthError::Revoked),
            Err(err) => {
                warn!(error = %err, "revocation registry unavailable, failing closed");
                Err(AuthError::Revoked)
            }
        }
    }

    pub(crate) async fn issue_token_pair(
        &self,
        sub: &str,
        user_id: Uuid,
        roles: &[String],
    ) -> Result<TokenPair, AuthError> {
        let (access_token, _access_jti) =
            self.signer
                .issue_access(sub, user_id, roles, self.config.access_ttl())?;
        let (refresh_token, _refresh_jti) =
            self.signer
                .issue_refresh(sub, user_id, self.config.refresh_ttl())?;

        let now = Utc::now();
        self.stores
            .sessions
            .create(RefreshSession {
                id: Uuid::new_v4(),
                user_id,
                email: sub.to_owned(),
                token_hash: hash_refresh_token(&refresh_token),
                created_at: now,
                expires_at: now + self.config.refresh_ttl(),
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_ttl_seconds(),
        })
    }

    pub(crate) async fn record(&self, event: AuditEvent) {
        self.audit.record(AuditRecord::now(event)).await;
    }

    pub(crate) fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub(crate) fn totp(&self) -> &TotpEngine {
        &self.totp
    }

    pub(crate) fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }

    pub(crate) fn recovery_pepper(&self) -> &[u8] {
        &self.recovery_pepper
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(crate) fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    pub(crate) fn stores(&self) -> &AuthnStores {
        &self.stores
    }
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| AuthError::Internal(anyhow!("claim timestamp out of range: {seconds}")))
}
