//! Public tracking lookup.
//!
//! Unauthenticated, so it sits behind its own rate limit bucket.

use axum::Router;
use axum::routing::get;
use serde::{Deserialize, Serialize};

use crate::middleware::{GateChain, Validated};
use crate::response::ApiOk;
use crate::schema::SchemaError;
use crate::state::AppState;

/// Bucket for public tracking lookups.
pub const TRACKING_BUCKET: &str = "tracking";

#[derive(Deserialize)]
struct TrackQuery {
    query: String,
}

#[derive(Serialize)]
struct TrackAccepted {
    query: String,
    message: &'static str,
}

async fn track(Validated(params): Validated<TrackQuery>) -> ApiOk<TrackAccepted> {
    ApiOk(TrackAccepted {
        query: params.query.trim().to_string(),
        message: "Tracking lookup accepted",
    })
}

/// Create the tracking router.
pub fn router(state: &AppState) -> Result<Router<AppState>, SchemaError> {
    Ok(Router::new().route(
        "/api/public/track",
        GateChain::new()
            .rate_limit(TRACKING_BUCKET)
            .validate_query(state.schema("track_query")?)
            .wrap(get(track), state),
    ))
}
