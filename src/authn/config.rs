//! Tunable knobs for the authentication orchestrator.

use chrono::Duration;

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_INTERMEDIATE_TTL_SECONDS: i64 = 5 * 60;
pub const DEFAULT_ISSUER: &str = "Custos";

/// Token lifetimes and issuer identity. Construct with [`AuthConfig::new`]
/// and override individual values with the `with_*` methods.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    intermediate_ttl_seconds: i64,
    issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            intermediate_ttl_seconds: DEFAULT_INTERMEDIATE_TTL_SECONDS,
            issuer: DEFAULT_ISSUER.to_owned(),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_intermediate_ttl_seconds(mut self, seconds: i64) -> Self {
        self.intermediate_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl_seconds)
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl_seconds)
    }

    #[must_use]
    pub fn intermediate_ttl(&self) -> Duration {
        Duration::seconds(self.intermediate_ttl_seconds)
    }

    #[must_use]
    pub fn intermediate_ttl_seconds(&self) -> i64 {
        self.intermediate_ttl_seconds
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}
