//! Application error types.
//!
//! Every rejection leaves the kernel as the same JSON envelope:
//! `{ "ok": false, "error": <kind>, "message": ... }`, with `fieldErrors`
//! for validation failures and `retryAfterSeconds` for rate limiting.

use std::any::Any;
use std::collections::BTreeMap;

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Field path (dotted, e.g. `items.0.amount`) to human-readable message.
pub type FieldErrors = BTreeMap<String, String>;

/// Stable error kind strings exposed to API consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    MalformedPayload,
    ValidationFailed,
    RateLimited,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::MalformedPayload => "MalformedPayload",
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::InternalError => "InternalError",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::MalformedPayload | ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    MalformedPayload(String),

    #[error("validation failed")]
    ValidationFailed(FieldErrors),

    #[error("too many requests, retry in {retry_after_secs} seconds")]
    RateLimited { limit: u32, retry_after_secs: u64 },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Unauthenticated => ErrorKind::Unauthenticated,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::MalformedPayload(_) => ErrorKind::MalformedPayload,
            AppError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            AppError::RateLimited { .. } => ErrorKind::RateLimited,
            AppError::Internal(_) => ErrorKind::InternalError,
        }
    }
}

/// Wire shape of a rejection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    ok: bool,
    error: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field_errors: Option<&'a FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();

        // Internal detail goes to the log, never to the caller
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let (field_errors, retry_after_seconds) = match &self {
            AppError::ValidationFailed(errors) => (Some(errors), None),
            AppError::RateLimited {
                retry_after_secs, ..
            } => (None, Some(*retry_after_secs)),
            _ => (None, None),
        };

        let body = ErrorBody {
            ok: false,
            error: kind,
            message,
            field_errors,
            retry_after_seconds,
        };
        let mut response = (kind.status(), Json(body)).into_response();

        if let AppError::RateLimited {
            limit,
            retry_after_secs,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert("retry-after", HeaderValue::from(retry_after_secs));
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            headers.insert("x-ratelimit-reset", reset_at_header(retry_after_secs));
        }

        response
    }
}

/// `X-RateLimit-Reset` value: the Unix time in milliseconds at which the
/// window resets, `after_secs` from now. `Retry-After` carries the relative
/// form.
pub(crate) fn reset_at_header(after_secs: u64) -> HeaderValue {
    let after_ms = i64::try_from(after_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    HeaderValue::from(chrono::Utc::now().timestamp_millis().saturating_add(after_ms))
}

/// Convert a panic caught by `CatchPanicLayer` into the internal error envelope.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };

    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
