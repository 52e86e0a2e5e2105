//! Token-lifetime and issuer arguments.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

use crate::authn::config::{
    DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_INTERMEDIATE_TTL_SECONDS, DEFAULT_ISSUER,
    DEFAULT_REFRESH_TTL_SECONDS,
};

pub const ARG_ACCESS_TTL: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL: &str = "refresh-ttl-seconds";
pub const ARG_INTERMEDIATE_TTL: &str = "intermediate-ttl-seconds";
pub const ARG_ISSUER: &str = "issuer";

#[derive(Debug)]
pub struct Options {
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub intermediate_ttl_seconds: i64,
    pub issuer: String,
}

impl Options {
    /// # Errors
    /// Returns an error when a default-valued argument is missing, which
    /// indicates a wiring bug.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            access_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TTL)
                .copied()
                .context("missing access-ttl-seconds")?,
            refresh_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TTL)
                .copied()
                .context("missing refresh-ttl-seconds")?,
            intermediate_ttl_seconds: matches
                .get_one::<i64>(ARG_INTERMEDIATE_TTL)
                .copied()
                .context("missing intermediate-ttl-seconds")?,
            issuer: matches
                .get_one::<String>(ARG_ISSUER)
                .cloned()
                .context("missing issuer")?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access-token lifetime in seconds")
                .default_value(leak_default(DEFAULT_ACCESS_TTL_SECONDS))
                .env("CUSTOS_ACCESS_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh-token lifetime in seconds")
                .default_value(leak_default(DEFAULT_REFRESH_TTL_SECONDS))
                .env("CUSTOS_REFRESH_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_INTERMEDIATE_TTL)
                .long(ARG_INTERMEDIATE_TTL)
                .help("Intermediate (two-factor pending) token lifetime in seconds")
                .default_value(leak_default(DEFAULT_INTERMEDIATE_TTL_SECONDS))
                .env("CUSTOS_INTERMEDIATE_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Issuer name shown in authenticator apps")
                .default_value(DEFAULT_ISSUER)
                .env("CUSTOS_ISSUER"),
        )
}

fn leak_default(value: i64) -> &'static str {
    Box::leak(value.to_string().into_boxed_str())
}
