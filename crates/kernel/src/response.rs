//! Success envelope for API handlers.

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Wraps a handler result as `{ "ok": true, ...result }` with status 200.
///
/// `T` must serialize to a JSON object so its fields can be flattened
/// next to `ok`.
#[derive(Debug, Clone)]
pub struct ApiOk<T>(pub T);

#[derive(Serialize)]
struct Envelope<'a, T> {
    ok: bool,
    #[serde(flatten)]
    body: &'a T,
}

impl<T: Serialize> IntoResponse for ApiOk<T> {
    fn into_response(self) -> Response {
        Json(Envelope {
            ok: true,
            body: &self.0,
        })
        .into_response()
    }
}
