//! Rate limit demonstration route.

use axum::Router;
use axum::routing::get;
use serde::Serialize;

use crate::middleware::{DEFAULT_BUCKET, GateChain};
use crate::response::ApiOk;
use crate::state::AppState;

#[derive(Serialize)]
struct Accepted {
    message: &'static str,
}

async fn accept() -> ApiOk<Accepted> {
    ApiOk(Accepted {
        message: "Rate limit demo endpoint: request accepted",
    })
}

/// Create the rate limit demo router.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/api/endpoint-to-test-rate-limit",
        GateChain::new()
            .rate_limit(DEFAULT_BUCKET)
            .wrap(get(accept).post(accept), state),
    )
}
