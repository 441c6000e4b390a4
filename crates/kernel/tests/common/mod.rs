#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Tests drive the REAL kernel router and gates. Only the external
//! collaborators are replaced: the session provider is a token table that
//! counts lookups, and audit sinks record or fail on demand.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use tapango_kernel::middleware::RateLimitConfig;
use tapango_kernel::models::{Identity, Role};
use tapango_kernel::services::audit::{AuditError, AuditEvent, AuditEventType, AuditSink};
use tapango_kernel::services::auth_provider::{
    Credentials, ProviderError, SessionProvider, StaticTokenProvider,
};
use tapango_kernel::{AppState, AppStateBuilder, build_app};

pub const ADMIN_TOKEN: &str = "admin-token";
pub const OPERATOR_TOKEN: &str = "operator-token";
pub const CUSTOMER_TOKEN: &str = "customer-token";

pub const ADMIN_ID: Uuid = Uuid::from_u128(0xa);
pub const OPERATOR_ID: Uuid = Uuid::from_u128(0xb);
pub const CUSTOMER_ID: Uuid = Uuid::from_u128(0xc);

/// Token table that counts every lookup, i.e. every time the auth gate ran.
pub struct CountingProvider {
    inner: StaticTokenProvider,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn new() -> Self {
        let inner = StaticTokenProvider::new()
            .with_token(ADMIN_TOKEN, Identity::new(ADMIN_ID, Role::Admin))
            .with_token(
                OPERATOR_TOKEN,
                Identity::new(OPERATOR_ID, Role::Operator).with_email("ops@tapango.test"),
            )
            .with_token(CUSTOMER_TOKEN, Identity::new(CUSTOMER_ID, Role::Customer));
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for CountingProvider {
    async fn current_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Identity>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.current_session(credentials).await
    }
}

/// Provider that cannot answer.
pub struct UnreachableProvider;

#[async_trait]
impl SessionProvider for UnreachableProvider {
    async fn current_session(
        &self,
        _credentials: &Credentials,
    ) -> Result<Option<Identity>, ProviderError> {
        Err(ProviderError::UnexpectedStatus {
            status: 503,
            endpoint: "auth/v1/user",
        })
    }
}

/// Keeps every audit event it receives.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn event_types(&self) -> Vec<AuditEventType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type)
            .collect()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Wait for the background writes to land.
    pub async fn wait_for(&self, count: usize) -> Vec<AuditEvent> {
        for _ in 0..100 {
            if self.events.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.events()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Audit sink whose backend is down.
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Err(AuditError::UnexpectedStatus(503))
    }
}

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: Arc<CountingProvider>,
    pub audit: Arc<RecordingAuditSink>,
}

impl TestApp {
    /// Kernel with default quotas.
    pub fn new() -> Self {
        Self::with_rate_limits(RateLimitConfig::default())
    }

    /// Kernel behind a proxy: forwarded headers identify the client.
    pub fn with_rate_limits(rate_limits: RateLimitConfig) -> Self {
        Self::build(rate_limits, true)
    }

    /// Kernel exposed directly: forwarded headers are ignored.
    pub fn without_proxy(rate_limits: RateLimitConfig) -> Self {
        Self::build(rate_limits, false)
    }

    fn build(rate_limits: RateLimitConfig, trust_forwarded: bool) -> Self {
        let provider = Arc::new(CountingProvider::new());
        let audit = Arc::new(RecordingAuditSink::default());

        let state = AppStateBuilder::new()
            .provider(provider.clone())
            .audit(audit.clone())
            .rate_limits(rate_limits)
            .trust_forwarded(trust_forwarded)
            .build();

        let router = build_app(state.clone()).expect("Failed to build router");

        Self {
            router,
            state,
            provider,
            audit,
        }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        send(&self.router, request).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(get(path, token)).await
    }

    pub async fn post_json(&self, path: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(post_json(path, token, body)).await
    }
}

/// Collected response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Drive `router` with one request and collect the JSON body.
pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to send request");

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(path: &str, token: Option<&str>, body: Value) -> Request<Body> {
    post_raw(path, token, body.to_string())
}

pub fn post_raw(path: &str, token: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::post(path).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body.into()).unwrap()
}

/// Counts handler invocations.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
