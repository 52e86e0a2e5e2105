//! Time-based one-time passwords (SHA-1, 6 digits, 30-second step).
//!
//! Verification tolerates one step of clock skew in either direction by
//! default, which absorbs device drift without materially weakening the
//! 30-second freshness guarantee.

pub mod crypto;
pub mod recovery;

use anyhow::anyhow;
use regex::Regex;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::errors::AuthError;

const DIGITS: usize = 6;
const STEP_SECONDS: u64 = 30;
const DEFAULT_SKEW_STEPS: u8 = 1;

/// How a submitted second-factor code should be dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeKind {
    Totp,
    Recovery,
}

/// Classify a submitted code by shape. Inputs matching neither pattern are
/// rejected before either verifier is consulted.
#[must_use]
pub fn classify_code(input: &str) -> Option<CodeKind> {
    let trimmed = input.trim();
    let is_totp = Regex::new(r"^\d{6}$").is_ok_and(|regex| regex.is_match(trimmed));
    if is_totp {
        return Some(CodeKind::Totp);
    }
    let is_recovery =
        Regex::new(r"^[A-Z0-9]{4}-[A-Z0-9]{4}$").is_ok_and(|regex| regex.is_match(trimmed));
    if is_recovery {
        return Some(CodeKind::Recovery);
    }
    None
}

/// Generates secrets, builds provisioning URIs, and verifies codes.
#[derive(Clone, Debug)]
pub struct TotpEngine {
    issuer: String,
    skew_steps: u8,
}

impl TotpEngine {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            skew_steps: DEFAULT_SKEW_STEPS,
        }
    }

    #[must_use]
    pub fn with_skew_steps(mut self, skew_steps: u8) -> Self {
        self.skew_steps = skew_steps;
        self
    }

    /// Generate a fresh 160-bit secret, base32-encoded.
    #[must_use]
    pub fn generate_secret(&self) -> String {
        let _ = self;
        Secret::generate_secret().to_encoded().to_string()
    }

    /// Build the `otpauth://totp/...` URI for authenticator-app enrollment.
    ///
    /// # Errors
    /// Returns an error if the stored secret cannot be decoded.
    pub fn provisioning_uri(&self, email: &str, secret_base32: &str) -> Result<String, AuthError> {
        Ok(self.totp(secret_base32, email)?.get_url())
    }

    /// Verify a code against the current wall clock.
    ///
    /// # Errors
    /// Returns an error if the stored secret cannot be decoded or the system
    /// clock is unavailable.
    pub fn verify(&self, secret_base32: &str, code: &str) -> Result<bool, AuthError> {
        self.totp(secret_base32, "account")?
            .check_current(code)
            .map_err(|err| AuthError::Internal(anyhow!("system clock unavailable: {err}")))
    }

    /// Verify a code at an explicit unix timestamp. The skew window applies
    /// on both sides of the given step.
    ///
    /// # Errors
    /// Returns an error if the stored secret cannot be decoded.
    pub fn verify_at(
        &self,
        secret_base32: &str,
        code: &str,
        timestamp: u64,
    ) -> Result<bool, AuthError> {
        Ok(self.totp(secret_base32, "account")?.check(code, timestamp))
    }

    /// Produce the code valid at an explicit unix timestamp.
    ///
    /// # Errors
    /// Returns an error if the stored secret cannot be decoded.
    pub fn generate_at(&self, secret_base32: &str, timestamp: u64) -> Result<String, AuthError> {
        Ok(self.totp(secret_base32, "account")?.generate(timestamp))
    }

    fn totp(&self, secret_base32: &str, account: &str) -> Result<TOTP, AuthError> {
        let secret = Secret::Encoded(secret_base32.to_owned())
            .to_bytes()
            .map_err(|err| AuthError::Internal(anyhow!("invalid TOTP secret: {err:?}")))?;
        // new_unchecked: RFC test vectors and some legacy enrollments use
        // 80-bit secrets; our own generated secrets are always 160-bit.
        Ok(TOTP::new_unchecked(
            Algorithm::SHA1,
            DIGITS,
            self.skew_steps,
            STEP_SECONDS,
            secret,
            Some(self.issuer.clone()),
            account.to_string(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "JBSWY3DPEHPK3PXP";

    fn engine() -> TotpEngine {
        TotpEngine::new("Custos")
    }

    #[test]
    fn generated_secret_is_160_bits_base32() {
        let secret = engine().generate_secret();
        let bytes = Secret::Encoded(secret).to_bytes().unwrap();
        assert_eq!(bytes.len(), 20);
    }

    #[test]
    fn provisioning_uri_carries_issuer_and_account() {
        let uri = engine()
            .provisioning_uri("alice@example.com", SECRET)
            .unwrap();
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("issuer=Custos"));
        assert!(uri.contains(&format!("secret={SECRET}")));
        assert!(uri.contains("alice%40example.com") || uri.contains("alice@example.com"));
    }

    #[test]
    fn code_is_stable_within_a_step_and_accepts_one_step_of_drift() {
        let engine = engine();
        let t0 = 1_700_000_010; // mid-step
        let code = engine.generate_at(SECRET, t0).unwrap();

        // Idempotent within the same 30-second step.
        assert!(engine.verify_at(SECRET, &code, t0).unwrap());
        assert!(engine.verify_at(SECRET, &code, t0).unwrap());

        // 25 seconds later is at most one step away: accepted.
        assert!(engine.verify_at(SECRET, &code, t0 + 25).unwrap());

        // 90 seconds later is three steps away: rejected.
        assert!(!engine.verify_at(SECRET, &code, t0 + 90).unwrap());
    }

    #[test]
    fn default_skew_accepts_one_step_and_rejects_two() {
        let engine = engine();
        let t0 = 1_700_000_000; // step-aligned
        let code = engine.generate_at(SECRET, t0).unwrap();

        assert!(engine.verify_at(SECRET, &code, t0 + 30).unwrap());
        // Submitting a future code one step early is also within skew.
        let next = engine.generate_at(SECRET, t0 + 30).unwrap();
        assert!(engine.verify_at(SECRET, &next, t0).unwrap());

        // Two steps of drift fall outside the window.
        assert!(!engine.verify_at(SECRET, &code, t0 + 60).unwrap());
        let later = engine.generate_at(SECRET, t0 + 60).unwrap();
        assert!(!engine.verify_at(SECRET, &later, t0).unwrap());
    }

    #[test]
    fn wrong_code_is_rejected() {
        let engine = engine();
        let t0 = 1_700_000_000;
        let code = engine.generate_at(SECRET, t0).unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(!engine.verify_at(SECRET, wrong, t0).unwrap());
    }

    #[test]
    fn classify_code_discriminates_formats() {
        assert_eq!(classify_code("123456"), Some(CodeKind::Totp));
        assert_eq!(classify_code(" 123456 "), Some(CodeKind::Totp));
        assert_eq!(classify_code("AB12-CD34"), Some(CodeKind::Recovery));
        assert_eq!(classify_code("12345"), None);
        assert_eq!(classify_code("1234567"), None);
        assert_eq!(classify_code("ab12-cd34"), None);
        assert_eq!(classify_code("AB12CD34"), None);
        assert_eq!(classify_code("AB12-CD3"), None);
        assert_eq!(classify_code(""), None);
    }
}
