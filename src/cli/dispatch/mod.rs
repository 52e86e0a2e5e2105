//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

use anyhow::{Context, Result};
use secrecy::SecretString;

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{
    auth, ARG_DSN, ARG_IDENTITY_URL, ARG_PORT, ARG_RECOVERY_PEPPER, ARG_SECRET_ENCRYPTION_KEY,
    ARG_SIGNING_KEY,
};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let identity_url = matches
        .get_one::<String>(ARG_IDENTITY_URL)
        .cloned()
        .context("missing required argument: --identity-url")?;
    let signing_key = matches
        .get_one::<String>(ARG_SIGNING_KEY)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --signing-key")?;
    let secret_encryption_key = matches
        .get_one::<String>(ARG_SECRET_ENCRYPTION_KEY)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --secret-encryption-key")?;
    let recovery_pepper = matches
        .get_one::<String>(ARG_RECOVERY_PEPPER)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --recovery-pepper")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        identity_url,
        signing_key,
        secret_encryption_key,
        recovery_pepper,
        access_ttl_seconds: auth_opts.access_ttl_seconds,
        refresh_ttl_seconds: auth_opts.refresh_ttl_seconds,
        intermediate_ttl_seconds: auth_opts.intermediate_ttl_seconds,
        issuer: auth_opts.issuer,
    }))
}
