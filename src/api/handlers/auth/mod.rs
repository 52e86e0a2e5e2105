//! Core auth endpoints: login, refresh, logout, revoke-all.

pub(crate) mod admin;
pub(crate) mod two_factor;
pub(crate) mod types;

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::authn::{Authenticator, LoginOutcome};
use crate::errors::AuthError;

use types::{ErrorBody, LoginRequest, LoginResponse, LogoutRequest, RefreshRequest, TokenPairBody};

/// Map the error taxonomy onto HTTP statuses. Token problems are all 401 so
/// responses do not reveal whether a token was malformed, expired, or
/// revoked.
pub(crate) fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::AuthenticationFailed
        | AuthError::InvalidToken
        | AuthError::Expired
        | AuthError::Revoked
        | AuthError::NotFound => StatusCode::UNAUTHORIZED,
        AuthError::InvalidCode => StatusCode::BAD_REQUEST,
        AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
        AuthError::NotConfigured => StatusCode::CONFLICT,
        AuthError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: &AuthError) -> Response {
    if let AuthError::Internal(inner) = err {
        error!("internal error: {inner:#}");
    }
    (status_for(err), Json(ErrorBody { error: err.kind() })).into_response()
}

/// Pull the bearer token out of the `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidToken)
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated, or two-factor pending", body = LoginResponse),
        (status = 401, description = "Credentials rejected", body = ErrorBody),
        (status = 503, description = "Identity provider unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    auth: Extension<Arc<Authenticator>>,
    Json(body): Json<LoginRequest>,
) -> impl IntoResponse {
    match auth.login(&body.email, &body.password).await {
        Ok(LoginOutcome::Tokens(pair)) => (
            StatusCode::OK,
            Json(LoginResponse::Tokens(TokenPairBody::from_pair(pair))),
        )
            .into_response(),
        Ok(LoginOutcome::TwoFactorRequired {
            intermediate_token,
            method,
            expires_in,
        }) => (
            StatusCode::OK,
            Json(LoginResponse::TwoFactorRequired {
                two_factor_required: true,
                method,
                intermediate_token,
                expires_in,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = TokenPairBody),
        (status = 401, description = "Refresh token rejected", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    auth: Extension<Arc<Authenticator>>,
    Json(body): Json<RefreshRequest>,
) -> impl IntoResponse {
    match auth.refresh(&body.refresh_token).await {
        Ok(pair) => (StatusCode::OK, Json(TokenPairBody::from_pair(pair))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Tokens invalidated"),
        (status = 401, description = "Access token rejected", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    Json(body): Json<LogoutRequest>,
) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.logout(token, body.refresh_token.as_deref()).await
    }
    .await;
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/revoke-all",
    responses(
        (status = 204, description = "All of the caller's tokens revoked"),
        (status = 401, description = "Access token rejected", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn revoke_all(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.revoke_all(token).await
    }
    .await;
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}
