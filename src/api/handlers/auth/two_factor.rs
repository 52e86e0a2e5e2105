//! Two-factor endpoints: enrollment, login verification, disable, and
//! recovery-code regeneration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::authn::two_factor::{TotpSetup, TwoFactorStatus};
use crate::authn::Authenticator;

use super::types::{
    ErrorBody, RecoveryCodesResponse, TokenPairBody, TwoFactorCodeRequest, TwoFactorVerifyRequest,
};
use super::{bearer_token, error_response};

#[utoipa::path(
    get,
    path = "/v1/auth/2fa",
    responses(
        (status = 200, description = "Two-factor state", body = TwoFactorStatus),
        (status = 401, description = "Access token rejected", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn status(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.two_factor_status(token).await
    }
    .await;
    match result {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/setup",
    responses(
        (status = 200, description = "Enrollment started", body = TotpSetup),
        (status = 401, description = "Access token rejected", body = ErrorBody),
        (status = 409, description = "Already enabled", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn setup_start(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.totp_setup_start(token).await
    }
    .await;
    match result {
        Ok(setup) => (StatusCode::OK, Json(setup)).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/confirm",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 200, description = "Two-factor enabled; recovery codes shown once", body = RecoveryCodesResponse),
        (status = 400, description = "Code rejected", body = ErrorBody),
        (status = 409, description = "No enrollment pending", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn setup_confirm(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    Json(body): Json<TwoFactorCodeRequest>,
) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.totp_setup_confirm(token, &body.code).await
    }
    .await;
    match result {
        Ok(recovery_codes) => (
            StatusCode::OK,
            Json(RecoveryCodesResponse { recovery_codes }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    request_body = TwoFactorVerifyRequest,
    responses(
        (status = 200, description = "Second factor accepted", body = TokenPairBody),
        (status = 400, description = "Code rejected", body = ErrorBody),
        (status = 401, description = "Intermediate token rejected", body = ErrorBody),
        (status = 429, description = "Attempt limit exceeded", body = ErrorBody)
    ),
    tag = "2fa"
)]
pub async fn verify(
    auth: Extension<Arc<Authenticator>>,
    Json(body): Json<TwoFactorVerifyRequest>,
) -> impl IntoResponse {
    match auth.verify_login(&body.intermediate_token, &body.code).await {
        Ok(pair) => (StatusCode::OK, Json(TokenPairBody::from_pair(pair))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/disable",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 204, description = "Two-factor disabled"),
        (status = 400, description = "Code rejected", body = ErrorBody),
        (status = 409, description = "Not enabled", body = ErrorBody),
        (status = 429, description = "Attempt limit exceeded", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn disable(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    Json(body): Json<TwoFactorCodeRequest>,
) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.two_factor_disable(token, &body.code).await
    }
    .await;
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/recovery-codes",
    responses(
        (status = 200, description = "Fresh recovery codes; old ones are void", body = RecoveryCodesResponse),
        (status = 409, description = "Not enabled", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn regenerate_recovery_codes(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.regenerate_recovery_codes(token).await
    }
    .await;
    match result {
        Ok(recovery_codes) => (
            StatusCode::OK,
            Json(RecoveryCodesResponse { recovery_codes }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
