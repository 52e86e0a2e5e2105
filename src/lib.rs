//! # Custos (Authentication & Session Lifecycle)
//!
//! `custos` is the authentication core of the Custos secrets platform. It
//! exchanges a primary credential (verified by an external identity provider)
//! for bearer tokens, runs the TOTP step-up flow, and owns session rotation
//! and token revocation.
//!
//! ## Token model
//!
//! Three token kinds share one HMAC signing key and are told apart by their
//! claims, never by context:
//!
//! - **Access** — short-lived, carries a flattened `roles` claim and no
//!   `type` claim.
//! - **Refresh** — `type: "refresh"`; the signature is only a carrier, the
//!   server-side session row is the authority.
//! - **Intermediate** — `type: "intermediate"` plus `requires_two_factor`,
//!   issued after primary auth when two-factor is enabled; expires in
//!   minutes and is never persisted.
//!
//! ## Two-factor authentication
//!
//! TOTP (SHA-1, 6 digits, 30-second step, one step of clock skew) with
//! Argon2id-peppered single-use recovery codes as the only fallback. TOTP
//! secrets are encrypted at rest. Verification and disable attempts are rate
//! limited per identity with independent fixed windows.
//!
//! ## Revocation
//!
//! Logout blacklists the presented token id for the remainder of its
//! lifetime; revoke-all additionally marks the owner so tokens issued before
//! the call are rejected too. The registry is consulted on every protected
//! request and treated fail-closed: if it cannot answer, the token is
//! considered revoked.

pub mod api;
pub mod audit;
pub mod authn;
pub mod cli;
pub mod errors;
pub mod identity;
pub mod rate_limit;
pub mod revocation;
pub mod session;
pub mod token;
pub mod totp;
pub mod two_factor;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
