//! HTTP surface: router wiring and server startup.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, Request},
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use url::Url;
use utoipa_axum::router::OpenApiRouter;

use crate::authn::{AuthConfig, Authenticator, AuthnStores};
use crate::audit::LogAuditSink;
use crate::identity::HttpIdentityProvider;
use crate::rate_limit::FixedWindowRateLimiter;
use crate::revocation::MemoryRevocationRegistry;
use crate::session::{PgSessionStore, SessionStore};
use crate::two_factor::PgTwoFactorStore;

pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

const REQUEST_ID_HEADER: &str = "x-request-id";
// Expired rows are also rejected at use; the sweep only bounds table growth.
const SESSION_SWEEP_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything needed to stand the service up.
pub struct ServerSettings {
    pub port: u16,
    pub dsn: String,
    pub identity_url: Url,
    pub signing_key: Vec<u8>,
    pub secret_encryption_key: Vec<u8>,
    pub recovery_pepper: Vec<u8>,
    pub auth: AuthConfig,
}

/// Start the server.
///
/// # Errors
/// Returns an error if the database, listener, or authenticator cannot be
/// set up.
pub async fn new(settings: ServerSettings) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&settings.dsn)
        .await
        .context("Failed to connect to database")?;

    let identity = Arc::new(
        HttpIdentityProvider::new(settings.identity_url)
            .map_err(|err| anyhow::anyhow!("failed to build identity client: {err}"))?,
    );

    let sessions = Arc::new(PgSessionStore::new(pool.clone()));
    spawn_session_sweeper(sessions.clone(), SESSION_SWEEP_PERIOD);

    let authenticator = Arc::new(
        Authenticator::new(
            settings.auth,
            &settings.signing_key,
            &settings.secret_encryption_key,
            &settings.recovery_pepper,
            identity,
            Arc::new(FixedWindowRateLimiter::new()),
            Arc::new(LogAuditSink),
            AuthnStores {
                sessions,
                revocations: Arc::new(MemoryRevocationRegistry::new()),
                two_factor: Arc::new(PgTwoFactorStore::new(pool.clone())),
            },
        )
        .map_err(|err| anyhow::anyhow!("failed to build authenticator: {err}"))?,
    );

    let (router, _openapi) = router().split_for_parts();
    let app = router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static(REQUEST_ID_HEADER),
                MakeRequestUuid,
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID_HEADER,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(authenticator))
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{}", settings.port)).await?;

    info!("Listening on [::]:{}", settings.port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn spawn_session_sweeper(sessions: Arc<dyn SessionStore>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sessions.sweep_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "swept expired refresh sessions"),
                Err(err) => tracing::warn!(%err, "session sweep failed"),
            }
        }
    });
}
