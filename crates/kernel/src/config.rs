//! Configuration loaded from environment variables.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::middleware::{Quota, RateLimitConfig};

/// Prefix for per-bucket quota variables, e.g. `RATE_LIMIT_API=10/10`.
const RATE_LIMIT_PREFIX: &str = "RATE_LIMIT_";

/// Hosted auth provider connection.
#[derive(Debug, Clone)]
pub struct AuthProviderConfig {
    /// Provider base URL, always ending in `/`.
    pub url: Url,

    /// Public (anon) API key sent with user lookups.
    pub anon_key: String,

    /// Service key used for audit inserts. When None, audit events go to
    /// the application log.
    pub service_key: Option<String>,

    /// HTTP timeout for provider calls (default: 5s).
    pub timeout: Duration,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// Hosted auth provider; None when `AUTH_PROVIDER_URL` is unset.
    pub auth_provider: Option<AuthProviderConfig>,

    /// Cookie carrying the provider access token (default: "sb-access-token").
    pub auth_cookie_name: String,

    /// Redis connection URL. Selects the Redis rate-limit and session
    /// stores; in-process stores are used when unset.
    pub redis_url: Option<String>,

    /// Quotas per rate limit bucket.
    pub rate_limits: RateLimitConfig,

    /// Directory of extra YAML schemas.
    pub schemas_dir: Option<PathBuf>,

    /// Development token table (`token=user_id:role[:email]`, comma-separated).
    pub dev_tokens: Option<String>,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// Cookie SameSite policy: "strict", "lax", or "none" (default: "strict").
    pub cookie_same_site: String,

    /// Whether `X-Forwarded-For`/`X-Real-IP` identify the client (default: false).
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env::vars())
    }

    /// Load configuration from an explicit set of variables.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        let var = |key: &str| vars.get(key).map(|v| v.trim().to_string());

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let timeout_secs: u64 = var("AUTH_PROVIDER_TIMEOUT_SECS")
            .unwrap_or_else(|| "5".to_string())
            .parse()
            .context("AUTH_PROVIDER_TIMEOUT_SECS must be a whole number of seconds")?;

        let auth_provider = match var("AUTH_PROVIDER_URL") {
            Some(raw) => {
                let anon_key = var("AUTH_PROVIDER_ANON_KEY").context(
                    "AUTH_PROVIDER_ANON_KEY is required when AUTH_PROVIDER_URL is set",
                )?;
                Some(AuthProviderConfig {
                    url: parse_base_url(&raw)?,
                    anon_key,
                    service_key: var("AUTH_SERVICE_KEY"),
                    timeout: Duration::from_secs(timeout_secs),
                })
            }
            None => None,
        };

        let auth_cookie_name =
            var("AUTH_COOKIE_NAME").unwrap_or_else(|| "sb-access-token".to_string());

        let mut rate_limits = RateLimitConfig::default();
        for (key, value) in &vars {
            if let Some(bucket) = key.strip_prefix(RATE_LIMIT_PREFIX) {
                let quota = Quota::parse(value).with_context(|| format!("invalid {key}"))?;
                rate_limits.set(bucket.to_lowercase(), quota);
            }
        }

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| vec!["*".to_string()]);

        let cookie_same_site = var("COOKIE_SAME_SITE")
            .unwrap_or_else(|| "strict".to_string())
            .to_lowercase();

        let trust_forwarded_headers = match var("TRUST_FORWARDED_HEADERS") {
            Some(raw) => parse_bool(&raw).context("TRUST_FORWARDED_HEADERS must be true or false")?,
            None => false,
        };

        Ok(Self {
            port,
            auth_provider,
            auth_cookie_name,
            redis_url: var("REDIS_URL"),
            rate_limits,
            schemas_dir: var("SCHEMAS_DIR").map(PathBuf::from),
            dev_tokens: var("DEV_TOKENS"),
            cors_allowed_origins,
            cookie_same_site,
            trust_forwarded_headers,
        })
    }
}

/// Parse a base URL so relative joins land under its path.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut raw = raw.to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).with_context(|| format!("AUTH_PROVIDER_URL is not a valid URL: {raw}"))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
