//! Error taxonomy for the authentication core.
//!
//! Dependency-layer failures (database, identity provider, registry) are
//! mapped into this taxonomy at the orchestrator boundary; raw driver errors
//! never reach callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Primary credential rejected by the identity provider, or a caller is
    /// missing a required role.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Signature, shape, or token-kind mismatch.
    #[error("invalid token")]
    InvalidToken,

    /// Token or session past its lifetime.
    #[error("expired")]
    Expired,

    /// Session or blacklist hit. Also returned when the revocation registry
    /// cannot be reached (fail-closed).
    #[error("revoked")]
    Revoked,

    /// No session row for the presented token.
    #[error("session not found")]
    NotFound,

    /// Two-factor code rejected. Deliberately ambiguous between "wrong code"
    /// and "wrong format" to avoid oracle leakage.
    #[error("invalid two-factor code")]
    InvalidCode,

    /// Fixed-window attempt limit exceeded. Never escalates to a lockout.
    #[error("too many attempts")]
    TooManyAttempts,

    /// Two-factor state is inconsistent with the requested operation, e.g.
    /// disabling when not enabled or confirming without a pending secret.
    #[error("two-factor not configured for this operation")]
    NotConfigured,

    /// A required dependency is unreachable or timed out.
    #[error("service unavailable")]
    ServiceUnavailable,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable name used in responses and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::InvalidToken => "invalid_token",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::NotFound => "not_found",
            Self::InvalidCode => "invalid_code",
            Self::TooManyAttempts => "too_many_attempts",
            Self::NotConfigured => "not_configured",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AuthError;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(AuthError::AuthenticationFailed.kind(), "authentication_failed");
        assert_eq!(AuthError::InvalidCode.kind(), "invalid_code");
        assert_eq!(AuthError::TooManyAttempts.kind(), "too_many_attempts");
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("boom")).kind(),
            "internal"
        );
    }

    #[test]
    fn internal_wraps_anyhow() {
        let err: AuthError = anyhow::anyhow!("database exploded").into();
        assert!(matches!(err, AuthError::Internal(_)));
        assert_eq!(err.to_string(), "database exploded");
    }
}
