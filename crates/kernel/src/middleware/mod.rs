//! HTTP middleware components.
//!
//! The request gates (rate limiting, authentication, validation) and the
//! [`GateChain`] that composes them per route.

pub mod auth;
pub mod pipeline;
pub mod rate_limit;
pub mod rate_limit_store;
pub mod validation;

pub use auth::{AuthGate, require_auth};
pub use pipeline::GateChain;
pub use rate_limit::{
    DEFAULT_BUCKET, Quota, RateLimitConfig, RateLimitExceeded, RateLimitGate, RateLimitStatus,
    RateLimiter, enforce_rate_limit, get_client_id,
};
pub use rate_limit_store::{
    MemoryRateLimitStore, RateLimitStore, RedisRateLimitStore, StoreError, WindowState,
};
pub use validation::{
    MAX_BODY_BYTES, PayloadSource, Validated, ValidatedPayload, ValidationGate, validate_request,
};
