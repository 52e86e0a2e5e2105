//! Audit trail for security-relevant events.
//!
//! Emission is best-effort: an unreachable sink never fails the operation
//! that produced the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// What happened, to whom.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSucceeded { user_id: Uuid, email: String },
    LoginRequiresTwoFactor { user_id: Uuid, email: String },
    LoginFailed { email: String },
    TokenRefreshed { user_id: Uuid },
    LoggedOut { user_id: Uuid },
    AllTokensRevoked { user_id: Uuid, by_admin: bool },
    TwoFactorEnabled { user_id: Uuid },
    TwoFactorDisabled { user_id: Uuid },
    TwoFactorVerified { user_id: Uuid, recovery_code_used: bool },
    TwoFactorVerifyFailed { user_id: Uuid },
    RecoveryCodesRegenerated { user_id: Uuid },
}

/// A recorded event with its emission time.
#[derive(Clone, Debug, Serialize)]
pub struct AuditRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    #[must_use]
    pub fn now(event: AuditEvent) -> Self {
        Self {
            at: Utc::now(),
            event,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Sink that writes events to the structured log stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, record: AuditRecord) {
        match serde_json::to_string(&record) {
            Ok(json) => info!(target: "audit", %json, "audit event"),
            Err(err) => warn!(error = %err, "failed to serialize audit event"),
        }
    }
}

/// Sink that POSTs events to an external collector. Delivery happens on a
/// detached task so request latency is unaffected.
#[derive(Clone, Debug)]
pub struct HttpAuditSink {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpAuditSink {
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: url::Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn record(&self, record: AuditRecord) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            if let Err(err) = client.post(endpoint).json(&record).send().await {
                warn!(error = %err, "failed to deliver audit event");
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let record = AuditRecord::now(AuditEvent::TwoFactorVerified {
            user_id: Uuid::nil(),
            recovery_code_used: true,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "two_factor_verified");
        assert_eq!(json["recovery_code_used"], true);
        assert!(json["at"].is_string());
    }

    #[test]
    fn revoke_event_distinguishes_admin() {
        let record = AuditRecord::now(AuditEvent::AllTokensRevoked {
            user_id: Uuid::nil(),
            by_admin: true,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "all_tokens_revoked");
        assert_eq!(json["by_admin"], true);
    }
}
