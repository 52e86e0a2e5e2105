use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::api::{self, ServerSettings};
use crate::authn::AuthConfig;

pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub identity_url: String,
    pub signing_key: SecretString,
    pub secret_encryption_key: SecretString,
    pub recovery_pepper: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub intermediate_ttl_seconds: i64,
    pub issuer: String,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("dsn", &self.dsn)
            .field("identity_url", &self.identity_url)
            .field("signing_key", &"***")
            .field("secret_encryption_key", &"***")
            .field("recovery_pepper", &"***")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("intermediate_ttl_seconds", &self.intermediate_ttl_seconds)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let identity_url = Url::parse(&args.identity_url)
        .with_context(|| format!("invalid identity URL: {}", args.identity_url))?;

    let secret_encryption_key = general_purpose::STANDARD
        .decode(args.secret_encryption_key.expose_secret())
        .context("secret-encryption-key must be base64")?;

    let auth = AuthConfig::new()
        .with_access_ttl_seconds(args.access_ttl_seconds)
        .with_refresh_ttl_seconds(args.refresh_ttl_seconds)
        .with_intermediate_ttl_seconds(args.intermediate_ttl_seconds)
        .with_issuer(args.issuer);

    api::new(ServerSettings {
        port: args.port,
        dsn: args.dsn,
        identity_url,
        signing_key: args.signing_key.expose_secret().as_bytes().to_vec(),
        secret_encryption_key,
        recovery_pepper: args.recovery_pepper.expose_secret().as_bytes().to_vec(),
        auth,
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let args = Args {
            port: 8080,
            dsn: "postgres://localhost/custos".into(),
            identity_url: "https://identity.internal/".into(),
            signing_key: SecretString::from("sign".to_owned()),
            secret_encryption_key: SecretString::from("enc".to_owned()),
            recovery_pepper: SecretString::from("pepper".to_owned()),
            access_ttl_seconds: 900,
            refresh_ttl_seconds: 604_800,
            intermediate_ttl_seconds: 300,
            issuer: "Custos".into(),
        };
        let rendered = format!("{args:?}");
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("pepper"));
        assert!(!rendered.contains("sign\""));
    }
}
