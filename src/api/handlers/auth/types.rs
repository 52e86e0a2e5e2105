//! Request and response bodies for the auth endpoints.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::two_factor::TwoFactorMethod;

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

/// Successful login: either a full pair or an intermediate token when the
/// account still owes a second factor.
#[derive(Serialize, ToSchema)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(TokenPairBody),
    TwoFactorRequired {
        two_factor_required: bool,
        method: TwoFactorMethod,
        intermediate_token: String,
        expires_in: i64,
    },
}

#[derive(Serialize, ToSchema)]
pub struct TokenPairBody {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl TokenPairBody {
    #[must_use]
    pub fn from_pair(pair: crate::authn::TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct TwoFactorVerifyRequest {
    pub intermediate_token: String,
    pub code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct TwoFactorCodeRequest {
    pub code: String,
}

#[derive(Serialize, ToSchema)]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AdminRevokeRequest {
    pub user_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct AdminUnrevokeRequest {
    /// Token id (`jti`) whose blacklist entry should be lifted.
    pub jti: String,
}

/// Machine-readable error body; `error` matches [`AuthError::kind`].
///
/// [`AuthError::kind`]: crate::errors::AuthError::kind
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: &'static str,
}
