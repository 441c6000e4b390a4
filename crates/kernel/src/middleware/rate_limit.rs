//! Rate limiting gate.
//!
//! Fixed-window counters keyed by `rate:{bucket}:{identifier}`, held in a
//! [`RateLimitStore`] so deployments can count in-process or in Redis.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::rate_limit_store::{RateLimitStore, StoreError};
use crate::error::{AppError, ErrorKind, reset_at_header};
use crate::metrics::Metrics;
use crate::models::AuthContext;

/// Bucket used when a route names one that is not configured.
pub const DEFAULT_BUCKET: &str = "api";

/// Requests allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub max_requests: u32,
    pub window: Duration,
}

impl Quota {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Parse `"max/seconds"`, e.g. `"10/10"`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let (max, secs) = raw
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("expected \"max/seconds\", got {raw:?}"))?;

        let max_requests: u32 = max
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid request count in {raw:?}"))?;
        let secs: u64 = secs
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid window in {raw:?}"))?;

        if max_requests == 0 || secs == 0 {
            anyhow::bail!("quota {raw:?} must have a positive count and window");
        }

        Ok(Self::new(max_requests, Duration::from_secs(secs)))
    }
}

/// Rate limit configuration per named bucket.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    buckets: HashMap<String, Quota>,
}

const API_QUOTA: Quota = Quota::new(10, Duration::from_secs(10));

impl Default for RateLimitConfig {
    fn default() -> Self {
        let buckets = [
            (DEFAULT_BUCKET, API_QUOTA),
            ("auth", Quota::new(5, Duration::from_secs(60))),
            ("tracking", Quota::new(30, Duration::from_secs(60))),
            ("uploads", Quota::new(5, Duration::from_secs(300))),
        ]
        .into_iter()
        .map(|(name, quota)| (name.to_string(), quota))
        .collect();

        Self { buckets }
    }
}

impl RateLimitConfig {
    /// Set or replace a bucket's quota.
    pub fn set(&mut self, bucket: impl Into<String>, quota: Quota) {
        self.buckets.insert(bucket.into(), quota);
    }

    pub fn with(mut self, bucket: impl Into<String>, quota: Quota) -> Self {
        self.set(bucket, quota);
        self
    }

    /// Quota for `bucket`, falling back to the `api` bucket.
    pub fn quota(&self, bucket: &str) -> Quota {
        self.buckets
            .get(bucket)
            .or_else(|| self.buckets.get(DEFAULT_BUCKET))
            .copied()
            .unwrap_or(API_QUOTA)
    }

    /// Configured bucket names, sorted.
    pub fn buckets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.buckets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Outcome of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Whole seconds until the window resets, at least 1.
    pub reset_after_secs: u64,
}

/// Outcome of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub retry_after_secs: u64,
}

impl From<RateLimitExceeded> for AppError {
    fn from(exceeded: RateLimitExceeded) -> Self {
        AppError::RateLimited {
            limit: exceeded.limit,
            retry_after_secs: exceeded.retry_after_secs,
        }
    }
}

/// Rate limiter over a shared counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one attempt and decide whether it is admitted.
    ///
    /// Rejected attempts still count toward the window. When the store is
    /// unreachable the request is admitted (fail open).
    pub async fn check(
        &self,
        bucket: &str,
        identifier: &str,
    ) -> Result<RateLimitStatus, RateLimitExceeded> {
        let quota = self.config.quota(bucket);
        let key = rate_limit_key(bucket, identifier);

        let state = match self.store.increment(&key, quota.window).await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, bucket, "rate limit check failed, allowing request");
                return Ok(RateLimitStatus {
                    limit: quota.max_requests,
                    remaining: quota.max_requests,
                    reset_after_secs: ceil_secs(quota.window).max(1),
                });
            }
        };

        let reset_after_secs = ceil_secs(state.resets_in).max(1);
        let limit = u64::from(quota.max_requests);

        if state.count > limit {
            debug!(
                bucket,
                identifier,
                count = state.count,
                limit,
                "rate limit exceeded"
            );
            Err(RateLimitExceeded {
                limit: quota.max_requests,
                retry_after_secs: reset_after_secs,
            })
        } else {
            Ok(RateLimitStatus {
                limit: quota.max_requests,
                remaining: u32::try_from(limit - state.count).unwrap_or(0),
                reset_after_secs,
            })
        }
    }

    /// Current count for an identifier (for monitoring).
    pub async fn get_count(&self, bucket: &str, identifier: &str) -> Result<u64, StoreError> {
        let state = self.store.get(&rate_limit_key(bucket, identifier)).await?;
        Ok(state.map_or(0, |s| s.count))
    }

    /// Reset the counter for an identifier.
    pub async fn reset(&self, bucket: &str, identifier: &str) -> Result<(), StoreError> {
        self.store.reset(&rate_limit_key(bucket, identifier)).await
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish()
    }
}

fn rate_limit_key(bucket: &str, identifier: &str) -> String {
    format!("rate:{bucket}:{identifier}")
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Get the client identifier (IP address) for rate limiting.
///
/// Forwarding headers are only consulted when `trust_forwarded` is set,
/// i.e. when the service sits behind a proxy that overwrites them.
pub fn get_client_id(addr: Option<SocketAddr>, headers: &HeaderMap, trust_forwarded: bool) -> String {
    if trust_forwarded {
        // Take the first IP in the chain
        if let Some(forwarded) = headers.get("x-forwarded-for")
            && let Ok(value) = forwarded.to_str()
            && let Some(ip) = value.split(',').next()
            && !ip.trim().is_empty()
        {
            return ip.trim().to_string();
        }

        if let Some(real_ip) = headers.get("x-real-ip")
            && let Ok(value) = real_ip.to_str()
            && !value.trim().is_empty()
        {
            return value.trim().to_string();
        }
    }

    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Identifier a request is counted under: the authenticated user when an
/// auth gate already ran, otherwise the client address.
pub fn request_identifier(request: &Request, trust_forwarded: bool) -> String {
    if let Some(ctx) = request.extensions().get::<AuthContext>() {
        return format!("user:{}", ctx.user_id);
    }

    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    get_client_id(addr, request.headers(), trust_forwarded)
}

/// State for one rate-limited route.
#[derive(Clone, Debug)]
pub struct RateLimitGate {
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub bucket: Arc<str>,
    pub trust_forwarded: bool,
}

/// Rate limiting middleware.
///
/// Admitted responses carry `X-RateLimit-*` headers; rejected requests get
/// the `RateLimited` envelope and never reach the handler.
/// `X-RateLimit-Reset` is an absolute Unix timestamp in milliseconds.
pub async fn enforce_rate_limit(
    State(gate): State<RateLimitGate>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = request_identifier(&request, gate.trust_forwarded);

    match gate.limiter.check(&gate.bucket, &identifier).await {
        Ok(status) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(status.limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(status.remaining));
            headers.insert("x-ratelimit-reset", reset_at_header(status.reset_after_secs));
            response
        }
        Err(exceeded) => {
            gate.metrics
                .record_rejection("rate_limit", ErrorKind::RateLimited);
            AppError::from(exceeded).into_response()
        }
    }
}
