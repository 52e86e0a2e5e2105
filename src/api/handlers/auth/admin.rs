//! Admin endpoints. Callers need the `ADMIN` role in their access token.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::authn::Authenticator;
use crate::revocation::RegistryStats;

use super::types::{AdminRevokeRequest, AdminUnrevokeRequest, ErrorBody};
use super::{bearer_token, error_response};

#[utoipa::path(
    post,
    path = "/v1/auth/admin/revoke",
    request_body = AdminRevokeRequest,
    responses(
        (status = 204, description = "All tokens of the target user revoked"),
        (status = 401, description = "Caller is not an admin", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn revoke_user(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    Json(body): Json<AdminRevokeRequest>,
) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.admin_revoke_user(token, body.user_id).await
    }
    .await;
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/admin/unrevoke",
    request_body = AdminUnrevokeRequest,
    responses(
        (status = 204, description = "Blacklist entry lifted"),
        (status = 401, description = "Caller is not an admin", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn unrevoke_token(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    Json(body): Json<AdminUnrevokeRequest>,
) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.admin_unrevoke_token(token, &body.jti).await
    }
    .await;
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/admin/stats",
    responses(
        (status = 200, description = "Revocation registry occupancy", body = RegistryStats),
        (status = 401, description = "Caller is not an admin", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn stats(headers: HeaderMap, auth: Extension<Arc<Authenticator>>) -> impl IntoResponse {
    let result = async {
        let token = bearer_token(&headers)?;
        auth.admin_stats(token).await
    }
    .await;
    match result {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(err) => error_response(&err),
    }
}
