//! Authentication and role authorization gate.
//!
//! Resolves the caller through the configured [`SessionProvider`], checks
//! the route's [`AccessPolicy`], and on success stores an [`AuthContext`]
//! in request extensions for handlers and later gates.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};
use uuid::Uuid;

use super::rate_limit::get_client_id;
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::models::{AccessPolicy, AuthContext};
use crate::services::audit::{AuditEvent, AuditEventType, AuditSink, record_in_background};
use crate::services::auth_provider::{Credentials, SessionProvider};

/// State for one authenticated route.
#[derive(Clone)]
pub struct AuthGate {
    pub provider: Arc<dyn SessionProvider>,
    pub audit: Arc<dyn AuditSink>,
    pub metrics: Arc<Metrics>,
    pub policy: Arc<AccessPolicy>,
    pub cookie_name: Arc<str>,
    pub trust_forwarded: bool,
}

impl AuthGate {
    fn audit(&self, request: &Request, event_type: AuditEventType, user_id: Option<Uuid>) -> AuditEvent {
        let addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let ip = get_client_id(addr, request.headers(), self.trust_forwarded);

        AuditEvent::new(
            event_type,
            user_id,
            request.method().as_str(),
            request.uri().path(),
            &ip,
        )
    }

    fn emit(&self, event: AuditEvent) {
        record_in_background(Arc::clone(&self.audit), Arc::clone(&self.metrics), event);
    }

    fn reject(&self, error: AppError) -> Response {
        self.metrics.record_rejection("auth", error.kind());
        error.into_response()
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("policy", &self.policy)
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

/// Middleware requiring an authenticated caller that satisfies the policy.
///
/// Every outcome is audited in the background. Provider failures surface
/// as `InternalError` and are not audited, since no decision was made.
pub async fn require_auth(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let credentials = Credentials::from_request(
        request.headers(),
        request.extensions(),
        &gate.cookie_name,
    );

    let identity = match gate.provider.current_session(&credentials).await {
        Ok(identity) => identity,
        Err(e) => {
            error!(error = %e, path = %request.uri().path(), "session lookup failed");
            gate.metrics.record_provider_error();
            return gate.reject(AppError::Internal(anyhow::Error::new(e)));
        }
    };

    let Some(identity) = identity else {
        debug!(path = %request.uri().path(), "no valid session");
        let event = gate.audit(&request, AuditEventType::AccessUnauthenticated, None);
        gate.emit(event);
        return gate.reject(AppError::Unauthenticated);
    };

    if !gate.policy.permits(identity.role) {
        debug!(
            user_id = %identity.user_id,
            role = identity.role.as_str(),
            path = %request.uri().path(),
            "role not permitted"
        );
        let event = gate
            .audit(&request, AuditEventType::AccessForbidden, Some(identity.user_id))
            .with("role", identity.role.as_str());
        gate.emit(event);
        return gate.reject(AppError::Forbidden(gate.policy.denial_message()));
    }

    let event = gate
        .audit(&request, AuditEventType::AccessGranted, Some(identity.user_id))
        .with("role", identity.role.as_str());
    gate.emit(event);

    request.extensions_mut().insert(AuthContext::from(identity));
    next.run(request).await
}

