//! Application state shared across all handlers and gates.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use tracing::{info, warn};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::middleware::{
    MemoryRateLimitStore, RateLimitConfig, RateLimitStore, RateLimiter, RedisRateLimitStore,
};
use crate::schema::{Schema, SchemaError, SchemaRegistry};
use crate::services::{
    AuditSink, ChainedSessionProvider, CookieSessionProvider, HostedAuditSink,
    HostedAuthProvider, SessionProvider, StaticTokenProvider, TracingAuditSink,
};

/// How often the in-process rate limit store drops elapsed windows.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Resolves request credentials to an identity.
    provider: Arc<dyn SessionProvider>,

    /// Destination for auth audit events.
    audit: Arc<dyn AuditSink>,

    /// Rate limiter over the configured store.
    rate_limiter: Arc<RateLimiter>,

    /// Request schemas by name.
    schemas: Arc<SchemaRegistry>,

    /// Prometheus metrics.
    metrics: Arc<Metrics>,

    /// Cookie carrying the provider access token.
    cookie_name: Arc<str>,

    /// Whether forwarding headers identify the client.
    trust_forwarded: bool,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// Connects to Redis when configured and loads extra schemas from disk.
    pub async fn new(config: &Config) -> Result<Self> {
        let mut builder = AppStateBuilder::new()
            .cookie_name(config.auth_cookie_name.as_str())
            .trust_forwarded(config.trust_forwarded_headers)
            .rate_limits(config.rate_limits.clone());

        // Session providers, most specific first
        let mut chain = ChainedSessionProvider::new();
        if let Some(tokens) = &config.dev_tokens {
            let provider = StaticTokenProvider::parse(tokens).context("invalid DEV_TOKENS")?;
            warn!(tokens = provider.len(), "development tokens enabled");
            chain = chain.push(Arc::new(provider));
        }
        if let Some(hosted) = &config.auth_provider {
            let provider =
                HostedAuthProvider::new(&hosted.url, hosted.anon_key.clone(), hosted.timeout)
                    .context("failed to create auth provider client")?;
            chain = chain.push(Arc::new(provider));

            if let Some(service_key) = &hosted.service_key {
                let sink = HostedAuditSink::new(&hosted.url, service_key.clone(), hosted.timeout)
                    .context("failed to create audit sink")?;
                builder = builder.audit(Arc::new(sink));
            }
        }
        chain = chain.push(Arc::new(CookieSessionProvider));
        builder = builder.provider(Arc::new(chain));

        if let Some(redis_url) = &config.redis_url {
            let redis = RedisClient::open(redis_url.as_str())
                .context("failed to create Redis client")?;

            // Test Redis connection
            let mut conn = redis
                .get_multiplexed_async_connection()
                .await
                .context("failed to connect to Redis")?;
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .context("Redis PING failed")?;

            info!("rate limiting with Redis store");
            builder = builder.rate_limit_store(Arc::new(RedisRateLimitStore::new(redis)));
        } else {
            let store = Arc::new(MemoryRateLimitStore::new());
            store.spawn_sweeper(SWEEP_INTERVAL);
            info!("rate limiting with in-process store");
            builder = builder.rate_limit_store(store);
        }

        let mut schemas = SchemaRegistry::with_builtin();
        if let Some(dir) = &config.schemas_dir {
            let loaded = schemas
                .load_dir(dir)
                .with_context(|| format!("failed to load schemas from {}", dir.display()))?;
            info!(count = loaded, dir = %dir.display(), "loaded schemas");
        }

        Ok(builder.schemas(schemas).build())
    }

    /// Session provider.
    pub fn provider(&self) -> &Arc<dyn SessionProvider> {
        &self.inner.provider
    }

    /// Audit sink.
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.inner.audit
    }

    /// Rate limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.rate_limiter
    }

    /// Schema registry.
    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.inner.schemas
    }

    /// Look up a registered schema.
    pub fn schema(&self, name: &str) -> Result<Arc<Schema>, SchemaError> {
        self.inner.schemas.require(name)
    }

    /// Metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Access-token cookie name.
    pub fn cookie_name(&self) -> &Arc<str> {
        &self.inner.cookie_name
    }

    pub fn trust_forwarded(&self) -> bool {
        self.inner.trust_forwarded
    }
}

/// Assembles [`AppState`] from explicit collaborators.
///
/// Unset parts default to in-process implementations: no sessions, audit
/// to the log, an in-memory rate limit store and the built-in schemas.
pub struct AppStateBuilder {
    provider: Option<Arc<dyn SessionProvider>>,
    audit: Option<Arc<dyn AuditSink>>,
    store: Option<Arc<dyn RateLimitStore>>,
    rate_limits: RateLimitConfig,
    schemas: Option<SchemaRegistry>,
    metrics: Option<Arc<Metrics>>,
    cookie_name: String,
    trust_forwarded: bool,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            audit: None,
            store: None,
            rate_limits: RateLimitConfig::default(),
            schemas: None,
            metrics: None,
            cookie_name: "sb-access-token".to_string(),
            trust_forwarded: false,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = Some(schemas);
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    pub fn build(self) -> AppState {
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(ChainedSessionProvider::new()));
        let audit = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryRateLimitStore::new()));

        AppState {
            inner: Arc::new(AppStateInner {
                provider,
                audit,
                rate_limiter: Arc::new(RateLimiter::new(store, self.rate_limits)),
                schemas: Arc::new(self.schemas.unwrap_or_else(SchemaRegistry::with_builtin)),
                metrics: self.metrics.unwrap_or_default(),
                cookie_name: Arc::from(self.cookie_name),
                trust_forwarded: self.trust_forwarded,
            }),
        }
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("rate_limiter", &self.inner.rate_limiter)
            .field("schemas", &self.inner.schemas.names())
            .field("cookie_name", &self.inner.cookie_name)
            .finish()
    }
}
