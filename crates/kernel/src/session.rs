//! Server-side cookie sessions.
//!
//! Sessions are read by [`CookieSessionProvider`](crate::services::CookieSessionProvider);
//! the kernel never writes them. Redis backs the store when configured,
//! otherwise sessions live in process memory.

use anyhow::{Context, Result};
use axum::Router;
use fred::prelude::*;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, SessionStore};
use tower_sessions_redis_store::RedisStore;
use tracing::info;

/// Default session expiry (24 hours).
pub const DEFAULT_SESSION_EXPIRY_HOURS: i64 = 24;

/// Map the configured SameSite policy; anything unrecognised is strict.
pub fn same_site(policy: &str) -> SameSite {
    match policy {
        "lax" => SameSite::Lax,
        "none" => SameSite::None,
        _ => SameSite::Strict,
    }
}

fn session_layer<S: SessionStore + Clone>(store: S, same_site: SameSite) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_secure(true) // Cookie only sent over HTTPS
        .with_http_only(true) // Cookie not accessible via JavaScript
        .with_same_site(same_site)
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            DEFAULT_SESSION_EXPIRY_HOURS,
        )))
}

/// Mount the session layer on `router`.
pub async fn apply_session_layer(
    router: Router,
    redis_url: Option<&str>,
    same_site: SameSite,
) -> Result<Router> {
    let Some(redis_url) = redis_url else {
        info!("using in-memory session store");
        return Ok(router.layer(session_layer(MemoryStore::default(), same_site)));
    };

    let config = Config::from_url(redis_url).context("failed to parse Redis URL")?;

    let pool = Builder::from_config(config)
        .build_pool(1)
        .context("failed to create Redis pool")?;

    pool.init()
        .await
        .context("failed to connect to Redis for sessions")?;

    info!("using Redis session store");
    Ok(router.layer(session_layer(RedisStore::new(pool), same_site)))
}
