//! Validation-only routes: no session or quota, just the schema.

use axum::Router;
use axum::routing::post;
use serde::{Deserialize, Serialize};

use crate::middleware::{GateChain, Validated};
use crate::response::ApiOk;
use crate::schema::SchemaError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Simulation {
    name: String,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
}

#[derive(Serialize)]
struct SimulationAccepted {
    message: &'static str,
    data: Simulation,
}

async fn simulate(Validated(data): Validated<Simulation>) -> ApiOk<SimulationAccepted> {
    ApiOk(SimulationAccepted {
        message: "Validation successful",
        data,
    })
}

/// Create the simulation router. `/api/validation-test` is an alias.
pub fn router(state: &AppState) -> Result<Router<AppState>, SchemaError> {
    let route = GateChain::new()
        .validate_body(state.schema("simulation")?)
        .wrap(post(simulate), state);

    Ok(Router::new()
        .route("/api/simulation", route.clone())
        .route("/api/validation-test", route))
}
