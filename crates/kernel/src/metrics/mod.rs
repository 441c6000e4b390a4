//! Prometheus metrics collection.
//!
//! Counts gate outcomes so rejections can be watched per gate and kind.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::error::ErrorKind;

/// Gate rejection labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RejectionLabels {
    pub gate: String,
    pub kind: String,
}

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    /// Rejections by gate and error kind.
    pub gate_rejections: Family<RejectionLabels, Counter>,

    /// Requests rejected by the rate limiter.
    pub rate_limit_rejections: Counter,

    /// Audit events the sink failed to store.
    pub audit_failures: Counter,

    /// Session provider calls that errored.
    pub auth_provider_errors: Counter,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let gate_rejections = Family::<RejectionLabels, Counter>::default();
        registry.register(
            "gate_rejections",
            "Requests rejected by a gate",
            gate_rejections.clone(),
        );

        let rate_limit_rejections = Counter::default();
        registry.register(
            "rate_limit_rejections",
            "Rate limit rejections",
            rate_limit_rejections.clone(),
        );

        let audit_failures = Counter::default();
        registry.register(
            "audit_failures",
            "Audit events that could not be written",
            audit_failures.clone(),
        );

        let auth_provider_errors = Counter::default();
        registry.register(
            "auth_provider_errors",
            "Session provider failures",
            auth_provider_errors.clone(),
        );

        Self {
            registry,
            gate_rejections,
            rate_limit_rejections,
            audit_failures,
            auth_provider_errors,
        }
    }

    /// Record a rejection by `gate`.
    pub fn record_rejection(&self, gate: &str, kind: ErrorKind) {
        let labels = RejectionLabels {
            gate: gate.to_string(),
            kind: kind.as_str().to_string(),
        };
        self.gate_rejections.get_or_create(&labels).inc();

        if kind == ErrorKind::RateLimited {
            self.rate_limit_rejections.inc();
        }
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures.inc();
    }

    pub fn record_provider_error(&self) {
        self.auth_provider_errors.inc();
    }

    /// Rejection count for one gate and kind (for tests and health output).
    pub fn rejections(&self, gate: &str, kind: ErrorKind) -> u64 {
        let labels = RejectionLabels {
            gate: gate.to_string(),
            kind: kind.as_str().to_string(),
        };
        self.gate_rejections.get_or_create(&labels).get()
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Panics
    ///
    /// Panics if Prometheus metric encoding to a `String` buffer fails.
    /// The `fmt::Write` impl for `String` is infallible, and all metric
    /// labels use derived `EncodeLabelSet` impls that do not produce
    /// `fmt::Error`.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        // Prometheus encoding to String buffer is infallible
        #[allow(clippy::expect_used)]
        encode(&mut buffer, &self.registry).expect("encoding metrics");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_counted_per_gate_and_kind() {
        let metrics = Metrics::new();
        metrics.record_rejection("auth", ErrorKind::Forbidden);
        metrics.record_rejection("auth", ErrorKind::Forbidden);
        metrics.record_rejection("rate_limit", ErrorKind::RateLimited);

        assert_eq!(metrics.rejections("auth", ErrorKind::Forbidden), 2);
        assert_eq!(metrics.rejections("auth", ErrorKind::Unauthenticated), 0);
        assert_eq!(metrics.rate_limit_rejections.get(), 1);
    }

    #[test]
    fn encode_includes_registered_metrics() {
        let metrics = Metrics::new();
        metrics.record_rejection("validation", ErrorKind::ValidationFailed);
        metrics.record_audit_failure();

        let text = metrics.encode();
        assert!(text.contains("gate_rejections_total"));
        assert!(text.contains("kind=\"ValidationFailed\""));
        assert!(text.contains("audit_failures_total 1"));
    }
}
