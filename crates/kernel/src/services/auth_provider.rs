//! Session providers: resolve request credentials to an [`Identity`].
//!
//! The kernel never issues sessions. It asks a provider "who is this?" and
//! gets back an identity or nothing. Providers:
//!
//! - [`HostedAuthProvider`]: the hosted auth service (user lookup plus a
//!   role lookup in the `users` table).
//! - [`CookieSessionProvider`]: server-side sessions held by `tower-sessions`.
//! - [`StaticTokenProvider`]: a fixed token table for development.
//! - [`ChainedSessionProvider`]: tries providers in order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use axum::http::{HeaderMap, Extensions, StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use tower_sessions::Session;
use tower_sessions::cookie::Cookie;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::models::{Identity, Role};

/// Session key holding the user's UUID.
pub const SESSION_USER_ID: &str = "user_id";

/// Session key holding the user's role string.
pub const SESSION_USER_ROLE: &str = "user_role";

/// Session key holding the user's email.
pub const SESSION_USER_EMAIL: &str = "user_email";

/// Credentials carried by a request.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// `Authorization: Bearer <token>`.
    pub bearer: Option<String>,
    /// Provider access token sent as a cookie.
    pub cookie_token: Option<String>,
    /// Server-side session, when the session layer is mounted.
    pub session: Option<Session>,
}

impl Credentials {
    /// Collect credentials from request headers and extensions.
    pub fn from_request(headers: &HeaderMap, extensions: &Extensions, cookie_name: &str) -> Self {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let cookie_token = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|raw| Cookie::split_parse(raw))
            .filter_map(Result::ok)
            .find(|c| c.name() == cookie_name)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty());

        Self {
            bearer,
            cookie_token,
            session: extensions.get::<Session>().cloned(),
        }
    }

    /// Bearer token if present, otherwise the cookie token.
    pub fn access_token(&self) -> Option<&str> {
        self.bearer.as_deref().or(self.cookie_token.as_deref())
    }
}

/// Session provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("auth provider request failed")]
    Http(#[from] reqwest::Error),

    #[error("auth provider returned status {status} for {endpoint}")]
    UnexpectedStatus { status: u16, endpoint: &'static str },

    #[error("invalid auth provider URL")]
    Url(#[from] url::ParseError),

    #[error("session store error")]
    Session(#[from] tower_sessions::session::Error),
}

/// Resolves the caller behind a set of credentials.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// `Ok(None)` means "no valid session"; errors mean the provider could
    /// not answer.
    async fn current_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Identity>, ProviderError>;
}

/// User record returned by the hosted auth service.
#[derive(Debug, Deserialize)]
struct HostedUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    #[serde(default)]
    role: Option<String>,
}

/// Hosted auth service client.
///
/// Validates the access token with `GET auth/v1/user`, then reads the
/// caller's role with `GET rest/v1/users?select=role&id=eq.<id>` using the
/// caller's own token, so row-level policies apply.
#[derive(Debug, Clone)]
pub struct HostedAuthProvider {
    client: reqwest::Client,
    base_url: Url,
    anon_key: String,
}

impl HostedAuthProvider {
    pub fn new(base_url: &Url, anon_key: String, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.clone(),
            anon_key,
        })
    }

    async fn lookup_role(&self, token: &str, user_id: Uuid) -> Result<Role, ProviderError> {
        let mut url = self.base_url.join("rest/v1/users")?;
        url.query_pairs_mut()
            .append_pair("select", "role")
            .append_pair("id", &format!("eq.{user_id}"));

        let response = self
            .client
            .get(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UnexpectedStatus {
                status: status.as_u16(),
                endpoint: "rest/v1/users",
            });
        }

        let rows: Vec<RoleRow> = response.json().await?;
        Ok(Role::from_stored(
            rows.first().and_then(|row| row.role.as_deref()),
        ))
    }
}

#[async_trait]
impl SessionProvider for HostedAuthProvider {
    async fn current_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Identity>, ProviderError> {
        let Some(token) = credentials.access_token() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(self.base_url.join("auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(status = status.as_u16(), "auth provider rejected token");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::UnexpectedStatus {
                status: status.as_u16(),
                endpoint: "auth/v1/user",
            });
        }

        let user: HostedUser = response.json().await?;
        let role = self.lookup_role(token, user.id).await?;

        Ok(Some(Identity {
            user_id: user.id,
            role,
            email: user.email,
        }))
    }
}

/// Reads the identity stored in a `tower-sessions` session.
#[derive(Debug, Clone, Default)]
pub struct CookieSessionProvider;

#[async_trait]
impl SessionProvider for CookieSessionProvider {
    async fn current_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Identity>, ProviderError> {
        let Some(session) = &credentials.session else {
            return Ok(None);
        };

        let Some(user_id) = session.get::<Uuid>(SESSION_USER_ID).await? else {
            return Ok(None);
        };
        let role = session.get::<String>(SESSION_USER_ROLE).await?;
        let email = session.get::<String>(SESSION_USER_EMAIL).await?;

        Ok(Some(Identity {
            user_id,
            role: Role::from_stored(role.as_deref()),
            email,
        }))
    }
}

/// Fixed token table, for development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Parse `token=user_id:role[:email]` entries separated by commas.
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let mut provider = Self::new();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((token, rest)) = entry.split_once('=') else {
                bail!("dev token entry '{entry}' must look like token=user_id:role[:email]");
            };

            let mut parts = rest.splitn(3, ':');
            let user_id = parts
                .next()
                .unwrap_or_default()
                .parse::<Uuid>()
                .with_context(|| format!("dev token '{token}' has an invalid user id"))?;
            let role = parts
                .next()
                .context("dev token entry is missing a role")?
                .parse::<Role>()
                .with_context(|| format!("dev token '{token}' has an invalid role"))?;

            let mut identity = Identity::new(user_id, role);
            if let Some(email) = parts.next().filter(|e| !e.is_empty()) {
                identity = identity.with_email(email);
            }

            provider.tokens.insert(token.trim().to_string(), identity);
        }

        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl SessionProvider for StaticTokenProvider {
    async fn current_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Identity>, ProviderError> {
        Ok(credentials
            .access_token()
            .and_then(|token| self.tokens.get(token))
            .cloned())
    }
}

/// Tries each provider in order; the first identity wins.
///
/// A provider error stops the chain: the caller cannot be reported as
/// unauthenticated when a provider could not answer.
#[derive(Clone, Default)]
pub struct ChainedSessionProvider {
    providers: Vec<Arc<dyn SessionProvider>>,
}

impl ChainedSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl SessionProvider for ChainedSessionProvider {
    async fn current_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Identity>, ProviderError> {
        for provider in &self.providers {
            if let Some(identity) = provider.current_session(credentials).await? {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for ChainedSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedSessionProvider")
            .field("providers", &self.providers.len())
            .finish()
    }
}
