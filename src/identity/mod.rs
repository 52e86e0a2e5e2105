//! Identity-provider seam.
//!
//! Primary credentials are never verified locally. The orchestrator sends
//! them to an external identity service and only consumes the verdict plus
//! the caller's directory attributes (id, roles). The HTTP client maps
//! provider rejections and outages onto the local error taxonomy so callers
//! never see transport details.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::errors::AuthError;
use crate::APP_USER_AGENT;

const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

/// Directory attributes for a successfully verified credential.
#[derive(Clone, Debug, Deserialize)]
pub struct VerifiedIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify an email/password pair.
    ///
    /// # Errors
    /// [`AuthError::AuthenticationFailed`] when the provider rejects the
    /// credential, [`AuthError::ServiceUnavailable`] when it cannot answer.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<VerifiedIdentity, AuthError>;

    /// Fetch the current role set for a known user, used when refreshing so
    /// a rotated access token reflects directory changes.
    async fn fetch_roles(&self, email: &str) -> Result<Vec<String>, AuthError>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct RolesResponse {
    roles: Vec<String>,
}

/// Client for an HTTP identity service exposing `POST /verify` and
/// `GET /users/{email}/roles`.
#[derive(Clone, Debug)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpIdentityProvider {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: Url) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .build()
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("http client: {err}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url
            .join(path)
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("identity url: {err}")))
    }
}

fn map_status(status: StatusCode) -> AuthError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        AuthError::AuthenticationFailed
    } else {
        warn!(status = %status, "identity provider returned unexpected status");
        AuthError::ServiceUnavailable
    }
}

fn map_transport(err: &reqwest::Error) -> AuthError {
    warn!(error = %err, "identity provider unreachable");
    AuthError::ServiceUnavailable
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_credentials(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<VerifiedIdentity, AuthError> {
        let url = self.endpoint("verify")?;
        let response = self
            .client
            .post(url)
            .json(&VerifyRequest {
                email,
                password: password.expose_secret(),
            })
            .send()
            .await
            .map_err(|err| map_transport(&err))?;

        if !response.status().is_success() {
            return Err(map_status(response.status()));
        }

        response
            .json::<VerifiedIdentity>()
            .await
            .map_err(|err| map_transport(&err))
    }

    async fn fetch_roles(&self, email: &str) -> Result<Vec<String>, AuthError> {
        let url = self.endpoint(&format!("users/{email}/roles"))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| map_transport(&err))?;

        if !response.status().is_success() {
            return Err(map_status(response.status()));
        }

        let body = response
            .json::<RolesResponse>()
            .await
            .map_err(|err| map_transport(&err))?;
        Ok(body.roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_authentication_failed() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED),
            AuthError::AuthenticationFailed
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN),
            AuthError::AuthenticationFailed
        ));
    }

    #[test]
    fn outages_map_to_service_unavailable() {
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR),
            AuthError::ServiceUnavailable
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY),
            AuthError::ServiceUnavailable
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS),
            AuthError::ServiceUnavailable
        ));
    }
}
