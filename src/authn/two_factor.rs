//! Two-factor operations on the orchestrator: enrollment, login-time
//! verification, disable, and recovery-code regeneration.

use anyhow::anyhow;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Authenticator, TokenPair};
use crate::audit::AuditEvent;
use crate::errors::AuthError;
use crate::totp::recovery::{find_matching_index, RecoveryCodeBatch};
use crate::totp::{classify_code, CodeKind};
use crate::two_factor::TwoFactorProfile;

/// Enrollment material returned by setup start. The secret is shown once;
/// only its ciphertext is stored.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct TotpSetup {
    pub secret: String,
    pub provisioning_uri: String,
}

/// Caller-visible two-factor state.
#[derive(Clone, Copy, Debug, Serialize, ToSchema)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub pending: bool,
    pub recovery_codes_remaining: usize,
}

impl Authenticator {
    /// Current two-factor state for the caller.
    ///
    /// # Errors
    /// Token errors per [`Self::authenticate_request`].
    pub async fn two_factor_status(
        &self,
        access_token: &str,
    ) -> Result<TwoFactorStatus, AuthError> {
        let claims = self.authenticate_request(access_token).await?;
        let profile = self.stores().two_factor.get(claims.user_id).await?;
        Ok(match profile {
            Some(profile) => TwoFactorStatus {
                enabled: profile.enabled,
                pending: profile.pending_secret_enc.is_some(),
                recovery_codes_remaining: profile.recovery_hashes.len(),
            },
            None => TwoFactorStatus {
                enabled: false,
                pending: false,
                recovery_codes_remaining: 0,
            },
        })
    }

    /// Begin TOTP enrollment: generate a secret, stash it encrypted as
    /// pending, and return the provisioning URI. Calling again replaces any
    /// previous pending secret.
    ///
    /// # Errors
    /// `NotConfigured` when the factor is already enabled.
    pub async fn totp_setup_start(&self, access_token: &str) -> Result<TotpSetup, AuthError> {
        let claims = self.authenticate_request(access_token).await?;
        let mut profile = self
            .stores()
            .two_factor
            .get(claims.user_id)
            .await?
            .unwrap_or_else(|| TwoFactorProfile::new(claims.user_id));
        if profile.enabled {
            return Err(AuthError::NotConfigured);
        }

        let secret = self.totp().generate_secret();
        let provisioning_uri = self.totp().provisioning_uri(&claims.sub, &secret)?;
        profile.pending_secret_enc =
            Some(self.cipher().encrypt(claims.user_id, secret.as_bytes())?);
        self.stores().two_factor.upsert(profile).await?;

        Ok(TotpSetup {
            secret,
            provisioning_uri,
        })
    }

    /// Confirm enrollment with a code from the authenticator app. On
    /// success the pending secret becomes active and a fresh recovery-code
    /// batch is returned, plaintext, exactly once.
    ///
    /// # Errors
    /// `NotConfigured` without a pending secret, `InvalidCode` for a wrong
    /// code.
    pub async fn totp_setup_confirm(
        &self,
        access_token: &str,
        code: &str,
    ) -> Result<Vec<String>, AuthError> {
        let claims = self.authenticate_request(access_token).await?;
        let mut profile = self
            .stores()
            .two_factor
            .get(claims.user_id)
            .await?
            .ok_or(AuthError::NotConfigured)?;
        let Some(pending) = profile.pending_secret_enc.as_deref() else {
            return Err(AuthError::NotConfigured);
        };

        let secret = self.decrypt_secret(claims.user_id, pending)?;
        if classify_code(code) != Some(CodeKind::Totp) || !self.totp().verify(&secret, code)? {
            return Err(AuthError::InvalidCode);
        }

        profile.confirm_pending()?;
        let batch = RecoveryCodeBatch::generate(self.recovery_pepper())?;
        profile.recovery_hashes = batch.code_hashes;
        self.stores().two_factor.upsert(profile).await?;

        info!(user_id = %claims.user_id, "two-factor enabled");
        self.record(AuditEvent::TwoFactorEnabled {
            user_id: claims.user_id,
        })
        .await;
        Ok(batch.codes)
    }

    /// Complete a two-factor login: exchange an intermediate token plus a
    /// TOTP or recovery code for a full token pair. Attempts are limited
    /// per identity.
    ///
    /// # Errors
    /// `TooManyAttempts` once the window is exhausted, `InvalidCode` for a
    /// wrong or malformed code, `NotConfigured` when the account has no
    /// active factor.
    pub async fn verify_login(
        &self,
        intermediate_token: &str,
        code: &str,
    ) -> Result<TokenPair, AuthError> {
        let claims = self.signer().verify_intermediate(intermediate_token)?;
        self.ensure_not_revoked(&claims.jti, claims.user_id, claims.iat)
            .await?;

        let rate_key = format!("2fa-verify:{}", claims.sub);
        if self.rate_limiter().check(&rate_key).await.is_limited() {
            return Err(AuthError::TooManyAttempts);
        }

        let mut profile = self
            .stores()
            .two_factor
            .get(claims.user_id)
            .await?
            .filter(|profile| profile.enabled)
            .ok_or(AuthError::NotConfigured)?;

        let recovery_code_used = match self.check_second_factor(&mut profile, code).await {
            Ok(recovery_code_used) => recovery_code_used,
            Err(err) => {
                if matches!(err, AuthError::InvalidCode) {
                    self.record(AuditEvent::TwoFactorVerifyFailed {
                        user_id: claims.user_id,
                    })
                    .await;
                }
                return Err(err);
            }
        };

        profile.mark_verified();
        self.stores().two_factor.upsert(profile).await?;

        self.rate_limiter().reset(&rate_key).await;
        let roles = self.identity().fetch_roles(&claims.sub).await?;
        let pair = self
            .issue_token_pair(&claims.sub, claims.user_id, &roles)
            .await?;
        self.record(AuditEvent::TwoFactorVerified {
            user_id: claims.user_id,
            recovery_code_used,
        })
        .await;
        Ok(pair)
    }

    /// Turn the factor off. Requires a currently valid TOTP or recovery
    /// code; all two-factor state is deleted on success. Attempts are
    /// limited per user.
    ///
    /// # Errors
    /// `NotConfigured` when not enabled, `InvalidCode`, `TooManyAttempts`.
    pub async fn two_factor_disable(&self, access_token: &str, code: &str) -> Result<(), AuthError> {
        let claims = self.authenticate_request(access_token).await?;

        let rate_key = format!("2fa-disable:{}", claims.user_id);
        if self.rate_limiter().check(&rate_key).await.is_limited() {
            return Err(AuthError::TooManyAttempts);
        }

        let mut profile = self
            .stores()
            .two_factor
            .get(claims.user_id)
            .await?
            .filter(|profile| profile.enabled)
            .ok_or(AuthError::NotConfigured)?;

        self.check_second_factor(&mut profile, code).await?;

        self.rate_limiter().reset(&rate_key).await;
        self.stores().two_factor.delete(claims.user_id).await?;
        info!(user_id = %claims.user_id, "two-factor disabled");
        self.record(AuditEvent::TwoFactorDisabled {
            user_id: claims.user_id,
        })
        .await;
        Ok(())
    }

    /// Replace the remaining recovery codes with a fresh batch. Requires an
    /// authenticated caller with the factor enabled; old codes stop working
    /// immediately.
    ///
    /// # Errors
    /// `NotConfigured` when not enabled.
    pub async fn regenerate_recovery_codes(
        &self,
        access_token: &str,
    ) -> Result<Vec<String>, AuthError> {
        let claims = self.authenticate_request(access_token).await?;
        let mut profile = self
            .stores()
            .two_factor
            .get(claims.user_id)
            .await?
            .filter(|profile| profile.enabled)
            .ok_or(AuthError::NotConfigured)?;

        let batch = RecoveryCodeBatch::generate(self.recovery_pepper())?;
        profile.recovery_hashes = batch.code_hashes;
        self.stores().two_factor.upsert(profile).await?;
        self.record(AuditEvent::RecoveryCodesRegenerated {
            user_id: claims.user_id,
        })
        .await;
        Ok(batch.codes)
    }

    /// Check a submitted second-factor code against the profile. A matching
    /// recovery code is consumed and the profile persisted immediately, so
    /// single use holds even if a later step fails. Returns whether a
    /// recovery code was used.
    async fn check_second_factor(
        &self,
        profile: &mut TwoFactorProfile,
        code: &str,
    ) -> Result<bool, AuthError> {
        match classify_code(code) {
            Some(CodeKind::Totp) => {
                let secret_enc = profile
                    .secret_enc
                    .as_deref()
                    .ok_or(AuthError::NotConfigured)?;
                let secret = self.decrypt_secret(profile.user_id, secret_enc)?;
                if self.totp().verify(&secret, code)? {
                    Ok(false)
                } else {
                    Err(AuthError::InvalidCode)
                }
            }
            Some(CodeKind::Recovery) => {
                let matched =
                    find_matching_index(code, &profile.recovery_hashes, self.recovery_pepper())?;
                let Some(index) = matched else {
                    return Err(AuthError::InvalidCode);
                };
                profile.consume_recovery_hash(index);
                self.stores().two_factor.upsert(profile.clone()).await?;
                Ok(true)
            }
            None => Err(AuthError::InvalidCode),
        }
    }

    fn decrypt_secret(&self, user_id: Uuid, secret_enc: &[u8]) -> Result<String, AuthError> {
        let bytes = self.cipher().decrypt(user_id, secret_enc)?;
        String::from_utf8(bytes)
            .map_err(|_| AuthError::Internal(anyhow!("stored TOTP secret is not valid UTF-8")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use secrecy::SecretString;

    use super::super::test_support::{
        authenticator, authenticator_with_limiter, FakeIdentityProvider,
    };
    use super::super::{Authenticator, LoginOutcome, TokenPair};
    use crate::errors::AuthError;
    use crate::rate_limit::FixedWindowRateLimiter;
    use crate::two_factor::TwoFactorMethod;

    fn password(raw: &str) -> SecretString {
        SecretString::from(raw.to_owned())
    }

    async fn login_tokens(auth: &Authenticator) -> TokenPair {
        match auth
            .login("alice@example.com", &password("hunter2"))
            .await
            .unwrap()
        {
            LoginOutcome::Tokens(pair) => pair,
            LoginOutcome::TwoFactorRequired { .. } => panic!("expected tokens"),
        }
    }

    /// Run setup start + confirm; returns (access pair, recovery codes,
    /// base32 secret).
    async fn enroll(auth: &Authenticator) -> (TokenPair, Vec<String>, String) {
        let pair = login_tokens(auth).await;
        let setup = auth.totp_setup_start(&pair.access_token).await.unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let code = auth.totp().generate_at(&setup.secret, now).unwrap();
        let codes = auth
            .totp_setup_confirm(&pair.access_token, &code)
            .await
            .unwrap();
        (pair, codes, setup.secret)
    }

    fn current_code(auth: &Authenticator, secret: &str) -> String {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        auth.totp().generate_at(secret, now).unwrap()
    }

    #[tokio::test]
    async fn enrollment_enables_the_factor_and_returns_ten_codes() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let (pair, codes, _secret) = enroll(&auth).await;
        assert_eq!(codes.len(), 10);

        let status = auth.two_factor_status(&pair.access_token).await.unwrap();
        assert!(status.enabled);
        assert!(!status.pending);
        assert_eq!(status.recovery_codes_remaining, 10);
    }

    #[tokio::test]
    async fn confirm_with_wrong_code_is_rejected() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let pair = login_tokens(&auth).await;
        let _setup = auth.totp_setup_start(&pair.access_token).await.unwrap();
        let result = auth.totp_setup_confirm(&pair.access_token, "000000").await;
        // Six digits is a valid shape, so this is a wrong code, not a
        // malformed one; either way the caller sees InvalidCode.
        assert!(matches!(result, Err(AuthError::InvalidCode)));

        let status = auth.two_factor_status(&pair.access_token).await.unwrap();
        assert!(!status.enabled);
        assert!(status.pending);
    }

    #[tokio::test]
    async fn confirm_without_pending_secret_is_not_configured() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let pair = login_tokens(&auth).await;
        let result = auth.totp_setup_confirm(&pair.access_token, "123456").await;
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[tokio::test]
    async fn login_bifurcates_once_enabled_and_verify_completes_it() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let (_pair, _codes, secret) = enroll(&auth).await;

        let outcome = auth
            .login("alice@example.com", &password("hunter2"))
            .await
            .unwrap();
        let LoginOutcome::TwoFactorRequired {
            intermediate_token,
            method,
            expires_in,
        } = outcome
        else {
            panic!("expected two-factor bifurcation");
        };
        assert_eq!(expires_in, 300);
        assert_eq!(method, TwoFactorMethod::Totp);

        let code = current_code(&auth, &secret);
        let pair = auth.verify_login(&intermediate_token, &code).await.unwrap();
        assert!(auth.authenticate_request(&pair.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn verify_login_rejects_access_tokens_as_bridge() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let (pair, _codes, secret) = enroll(&auth).await;
        let code = current_code(&auth, &secret);
        let result = auth.verify_login(&pair.access_token, &code).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn recovery_code_completes_login_exactly_once() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let (pair, codes, _secret) = enroll(&auth).await;
        let recovery = codes.first().unwrap().clone();

        let login_password = password("hunter2");
        let login = || auth.login("alice@example.com", &login_password);
        let LoginOutcome::TwoFactorRequired {
            intermediate_token, ..
        } = login().await.unwrap()
        else {
            panic!("expected bifurcation");
        };
        assert!(auth
            .verify_login(&intermediate_token, &recovery)
            .await
            .is_ok());

        let status = auth.two_factor_status(&pair.access_token).await.unwrap();
        assert_eq!(status.recovery_codes_remaining, 9);

        // The same code is spent.
        let LoginOutcome::TwoFactorRequired {
            intermediate_token, ..
        } = login().await.unwrap()
        else {
            panic!("expected bifurcation");
        };
        let replay = auth.verify_login(&intermediate_token, &recovery).await;
        assert!(matches!(replay, Err(AuthError::InvalidCode)));
    }

    #[tokio::test]
    async fn six_wrong_codes_hit_the_attempt_limit() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let (_pair, _codes, _secret) = enroll(&auth).await;
        let LoginOutcome::TwoFactorRequired {
            intermediate_token, ..
        } = auth
            .login("alice@example.com", &password("hunter2"))
            .await
            .unwrap()
        else {
            panic!("expected bifurcation");
        };

        for _ in 0..5 {
            let result = auth.verify_login(&intermediate_token, "000000").await;
            assert!(matches!(result, Err(AuthError::InvalidCode)));
        }
        let result = auth.verify_login(&intermediate_token, "000000").await;
        assert!(matches!(result, Err(AuthError::TooManyAttempts)));
    }

    #[tokio::test]
    async fn successful_verify_resets_the_attempt_window() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let limiter = Arc::new(FixedWindowRateLimiter::new());
        let auth = authenticator_with_limiter(identity, limiter);

        let (_pair, _codes, secret) = enroll(&auth).await;
        let LoginOutcome::TwoFactorRequired {
            intermediate_token, ..
        } = auth
            .login("alice@example.com", &password("hunter2"))
            .await
            .unwrap()
        else {
            panic!("expected bifurcation");
        };

        for _ in 0..4 {
            let result = auth.verify_login(&intermediate_token, "000000").await;
            assert!(matches!(result, Err(AuthError::InvalidCode)));
        }
        let code = current_code(&auth, &secret);
        assert!(auth.verify_login(&intermediate_token, &code).await.is_ok());

        // Fresh window afterwards: five more wrong attempts before limiting.
        let LoginOutcome::TwoFactorRequired {
            intermediate_token, ..
        } = auth
            .login("alice@example.com", &password("hunter2"))
            .await
            .unwrap()
        else {
            panic!("expected bifurcation");
        };
        for _ in 0..5 {
            let result = auth.verify_login(&intermediate_token, "000000").await;
            assert!(matches!(result, Err(AuthError::InvalidCode)));
        }
    }

    #[tokio::test]
    async fn disable_removes_all_state_and_login_goes_direct() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let (pair, _codes, secret) = enroll(&auth).await;
        let code = current_code(&auth, &secret);
        auth.two_factor_disable(&pair.access_token, &code)
            .await
            .unwrap();

        let status = auth.two_factor_status(&pair.access_token).await.unwrap();
        assert!(!status.enabled);
        assert_eq!(status.recovery_codes_remaining, 0);

        let outcome = auth
            .login("alice@example.com", &password("hunter2"))
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Tokens(_)));
    }

    #[tokio::test]
    async fn disable_accepts_a_recovery_code() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let (pair, codes, _secret) = enroll(&auth).await;
        auth.two_factor_disable(&pair.access_token, codes.first().unwrap())
            .await
            .unwrap();

        let status = auth.two_factor_status(&pair.access_token).await.unwrap();
        assert!(!status.enabled);
    }

    #[tokio::test]
    async fn disable_when_not_enabled_is_not_configured() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let pair = login_tokens(&auth).await;
        let result = auth.two_factor_disable(&pair.access_token, "123456").await;
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[tokio::test]
    async fn regenerate_needs_only_an_authenticated_enabled_caller() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let pair = login_tokens(&auth).await;
        let denied = auth.regenerate_recovery_codes(&pair.access_token).await;
        assert!(matches!(denied, Err(AuthError::NotConfigured)));
    }

    #[tokio::test]
    async fn regenerate_replaces_the_batch() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let (pair, old_codes, _secret) = enroll(&auth).await;
        let new_codes = auth
            .regenerate_recovery_codes(&pair.access_token)
            .await
            .unwrap();
        assert_eq!(new_codes.len(), 10);

        // An old code no longer completes a login.
        let LoginOutcome::TwoFactorRequired {
            intermediate_token, ..
        } = auth
            .login("alice@example.com", &password("hunter2"))
            .await
            .unwrap()
        else {
            panic!("expected bifurcation");
        };
        let result = auth
            .verify_login(&intermediate_token, old_codes.first().unwrap())
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCode)));
    }

    #[tokio::test]
    async fn malformed_codes_are_invalid_without_touching_verifiers() {
        let identity = Arc::new(FakeIdentityProvider::new());
        identity.add_user("alice@example.com", "hunter2", &["USER"]);
        let auth = authenticator(identity);

        let (_pair, _codes, _secret) = enroll(&auth).await;
        let LoginOutcome::TwoFactorRequired {
            intermediate_token, ..
        } = auth
            .login("alice@example.com", &password("hunter2"))
            .await
            .unwrap()
        else {
            panic!("expected bifurcation");
        };
        let result = auth.verify_login(&intermediate_token, "not-a-code").await;
        assert!(matches!(result, Err(AuthError::InvalidCode)));
    }
}
