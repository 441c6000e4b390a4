//! Per-route gate composition.
//!
//! A [`GateChain`] lists gates in execution order and wraps a route with
//! them. The first gate listed sees the request first; a rejection stops
//! the chain and the handler never runs.

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::MethodRouter;

use super::auth::{AuthGate, require_auth};
use super::rate_limit::{RateLimitGate, enforce_rate_limit};
use super::validation::{PayloadSource, ValidationGate, validate_request};
use crate::models::AccessPolicy;
use crate::schema::Schema;
use crate::state::AppState;

#[derive(Debug, Clone)]
enum Gate {
    RateLimit(Arc<str>),
    Authenticate(AccessPolicy),
    Validate(Arc<Schema>, PayloadSource),
}

/// Ordered list of gates for one route.
#[derive(Debug, Clone, Default)]
pub struct GateChain {
    gates: Vec<Gate>,
}

impl GateChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count requests against `bucket`.
    pub fn rate_limit(mut self, bucket: &str) -> Self {
        self.gates.push(Gate::RateLimit(Arc::from(bucket)));
        self
    }

    /// Require an authenticated caller satisfying `policy`.
    pub fn authenticate(mut self, policy: AccessPolicy) -> Self {
        self.gates.push(Gate::Authenticate(policy));
        self
    }

    /// Validate the JSON body.
    pub fn validate_body(mut self, schema: Arc<Schema>) -> Self {
        self.gates.push(Gate::Validate(schema, PayloadSource::Body));
        self
    }

    /// Validate the query string.
    pub fn validate_query(mut self, schema: Arc<Schema>) -> Self {
        self.gates.push(Gate::Validate(schema, PayloadSource::Query));
        self
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Wrap `route` with the gates.
    ///
    /// Layers added last run first, so gates are applied in reverse.
    pub fn wrap(self, route: MethodRouter<AppState>, state: &AppState) -> MethodRouter<AppState> {
        self.gates
            .into_iter()
            .rev()
            .fold(route, |route, gate| match gate {
                Gate::RateLimit(bucket) => route.route_layer(from_fn_with_state(
                    RateLimitGate {
                        limiter: Arc::clone(state.rate_limiter()),
                        metrics: Arc::clone(state.metrics()),
                        bucket,
                        trust_forwarded: state.trust_forwarded(),
                    },
                    enforce_rate_limit,
                )),
                Gate::Authenticate(policy) => route.route_layer(from_fn_with_state(
                    AuthGate {
                        provider: Arc::clone(state.provider()),
                        audit: Arc::clone(state.audit()),
                        metrics: Arc::clone(state.metrics()),
                        policy: Arc::new(policy),
                        cookie_name: Arc::clone(state.cookie_name()),
                        trust_forwarded: state.trust_forwarded(),
                    },
                    require_auth,
                )),
                Gate::Validate(schema, source) => route.route_layer(from_fn_with_state(
                    ValidationGate {
                        schema,
                        source,
                        metrics: Arc::clone(state.metrics()),
                    },
                    validate_request,
                )),
            })
    }
}
