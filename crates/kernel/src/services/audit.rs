//! Audit logging for authentication outcomes.
//!
//! Events are written best-effort: [`record_in_background`] hands the event
//! to a spawned task and the request never waits on, or fails because of,
//! the sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::metrics::Metrics;

/// Kind of authentication outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AccessGranted,
    AccessUnauthenticated,
    AccessForbidden,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::AccessGranted => "access_granted",
            AuditEventType::AccessUnauthenticated => "access_unauthenticated",
            AuditEventType::AccessForbidden => "access_forbidden",
        }
    }
}

/// Audit record as stored by the sink.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub user_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    /// Build an event for a request.
    ///
    /// The IP is validated before storage; anything that does not parse as
    /// an address is recorded as `"invalid"`.
    pub fn new(
        event_type: AuditEventType,
        user_id: Option<Uuid>,
        method: &str,
        path: &str,
        ip: &str,
    ) -> Self {
        Self {
            event_type,
            user_id,
            metadata: serde_json::json!({
                "method": method,
                "path": path,
                "ip": sanitize_ip(ip),
                "at": chrono::Utc::now().to_rfc3339(),
            }),
        }
    }

    /// Attach an extra metadata entry.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}

fn sanitize_ip(ip: &str) -> &str {
    if ip.parse::<std::net::IpAddr>().is_ok() {
        ip
    } else {
        "invalid"
    }
}

/// Audit sink errors.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit request failed")]
    Http(#[from] reqwest::Error),

    #[error("audit endpoint returned status {0}")]
    UnexpectedStatus(u16),

    #[error("invalid audit endpoint URL")]
    Url(#[from] url::ParseError),
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes audit events to the application log.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        info!(
            target: "audit",
            event_type = event.event_type.as_str(),
            user_id = ?event.user_id,
            metadata = %event.metadata,
            "auth event"
        );
        Ok(())
    }
}

/// Inserts audit events into the hosted provider's `audit_logs` table over
/// its REST interface.
#[derive(Debug, Clone)]
pub struct HostedAuditSink {
    client: reqwest::Client,
    endpoint: Url,
    service_key: String,
}

impl HostedAuditSink {
    pub fn new(base_url: &Url, service_key: String, timeout: Duration) -> Result<Self, AuditError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = base_url.join("rest/v1/audit_logs")?;
        Ok(Self {
            client,
            endpoint,
            service_key,
        })
    }
}

#[async_trait]
impl AuditSink for HostedAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("prefer", "return=minimal")
            .json(event)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::UnexpectedStatus(status.as_u16()));
        }

        debug!(event_type = event.event_type.as_str(), "audit event stored");
        Ok(())
    }
}

/// Record `event` on a background task.
///
/// Failures are logged and counted, never propagated.
pub fn record_in_background(sink: Arc<dyn AuditSink>, metrics: Arc<Metrics>, event: AuditEvent) {
    tokio::spawn(async move {
        if let Err(e) = sink.record(&event).await {
            warn!(
                error = %e,
                event_type = event.event_type.as_str(),
                user_id = ?event.user_id,
                "failed to write auth audit log"
            );
            metrics.record_audit_failure();
        }
    });
}
