//! Schema validation gate.
//!
//! Reads the JSON body (or the query string), checks it against a
//! [`Schema`], and stores the normalized payload as a [`ValidatedPayload`]
//! extension. The request body is forwarded unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::AppError;
use crate::metrics::Metrics;
use crate::schema::{Schema, validate};

/// Largest request body the gate will read.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Where the gate reads the payload from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    Body,
    Query,
}

/// State for one validated route.
#[derive(Clone, Debug)]
pub struct ValidationGate {
    pub schema: Arc<Schema>,
    pub source: PayloadSource,
    pub metrics: Arc<Metrics>,
}

/// Normalized payload produced by the validation gate.
#[derive(Debug, Clone)]
pub struct ValidatedPayload(pub Arc<Value>);

/// Validation middleware.
pub async fn validate_request(
    State(gate): State<ValidationGate>,
    request: Request,
    next: Next,
) -> Response {
    let (request, payload) = match read_payload(request, gate.source).await {
        Ok(read) => read,
        Err(e) => return reject(&gate, e),
    };

    match validate(&gate.schema, &payload) {
        Ok(normalized) => {
            let mut request = request;
            request
                .extensions_mut()
                .insert(ValidatedPayload(Arc::new(normalized)));
            next.run(request).await
        }
        Err(field_errors) => {
            debug!(
                schema = %gate.schema.name,
                fields = ?field_errors.keys().collect::<Vec<_>>(),
                "payload failed validation"
            );
            reject(&gate, AppError::ValidationFailed(field_errors))
        }
    }
}

fn reject(gate: &ValidationGate, error: AppError) -> Response {
    gate.metrics.record_rejection("validation", error.kind());
    error.into_response()
}

/// Extract the raw payload, returning a request that can still be read.
async fn read_payload(request: Request, source: PayloadSource) -> Result<(Request, Value), AppError> {
    match source {
        PayloadSource::Query => {
            let payload = query_payload(request.uri())?;
            Ok((request, payload))
        }
        PayloadSource::Body => {
            let (parts, body) = request.into_parts();
            let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|_| {
                    AppError::MalformedPayload("request body is unreadable or too large".to_string())
                })?;
            let payload = body_payload(&bytes)?;
            Ok((Request::from_parts(parts, Body::from(bytes)), payload))
        }
    }
}

fn body_payload(bytes: &Bytes) -> Result<Value, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::MalformedPayload("request body is empty".to_string()));
    }

    serde_json::from_slice(bytes)
        .map_err(|_| AppError::MalformedPayload("request body is not valid JSON".to_string()))
}

/// Decode the query string into a JSON object of strings.
fn query_payload(uri: &axum::http::Uri) -> Result<Value, AppError> {
    let Query(params) = Query::<BTreeMap<String, String>>::try_from_uri(uri)
        .map_err(|_| AppError::MalformedPayload("query string is malformed".to_string()))?;

    Ok(Value::Object(
        params
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
    ))
}

/// Typed view of the validated payload.
///
/// Only usable on routes with a validation gate; anywhere else, or when `T`
/// does not match the schema's output, it is an internal error.
#[derive(Debug, Clone)]
pub struct Validated<T>(pub T);

impl<S, T> FromRequestParts<S> for Validated<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ValidatedPayload(payload) = parts
            .extensions
            .get::<ValidatedPayload>()
            .cloned()
            .context("route has no validation gate")?;

        let value = T::deserialize(payload.as_ref())
            .context("validated payload does not match handler type")?;
        Ok(Validated(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_body_is_empty() {
        let err = body_payload(&Bytes::from_static(b" \n")).unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(m) if m.contains("empty")));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = body_payload(&Bytes::from_static(b"{\"value\":")).unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }

    #[test]
    fn query_decodes_to_string_object() {
        let uri: axum::http::Uri = "/api/public/track?trackingNumber=TRK%20123&x=1".parse().unwrap();
        let payload = query_payload(&uri).unwrap();
        assert_eq!(payload["trackingNumber"], "TRK 123");
        assert_eq!(payload["x"], "1");

        let uri: axum::http::Uri = "/api/public/track".parse().unwrap();
        assert_eq!(query_payload(&uri).unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn body_is_forwarded_unchanged() {
        let raw = r#"{"value": 1, "extra": true}"#;
        let request = Request::builder()
            .uri("/x")
            .body(Body::from(raw))
            .unwrap();

        let (request, payload) = read_payload(request, PayloadSource::Body).await.unwrap();
        assert_eq!(payload["extra"], true);

        let forwarded = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .unwrap();
        assert_eq!(forwarded, raw.as_bytes());
    }

    #[tokio::test]
    async fn oversized_body_is_malformed() {
        let request = Request::builder()
            .uri("/x")
            .body(Body::from(vec![b' '; MAX_BODY_BYTES + 1]))
            .unwrap();
        let err = read_payload(request, PayloadSource::Body).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }
}
