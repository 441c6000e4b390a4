//! Shipment routes.

use axum::Router;
use axum::routing::post;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{DEFAULT_BUCKET, GateChain, Validated};
use crate::models::{AccessPolicy, AuthContext, Role};
use crate::response::ApiOk;
use crate::schema::SchemaError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ServiceType {
    Standard,
    Express,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Shipment {
    shipment_ref: String,
    customer_id: String,
    origin: String,
    destination: String,
    weight: f64,
    pieces: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    service_type: ServiceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    declared_value: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentAccepted {
    message: &'static str,
    shipment: Shipment,
    created_by: Uuid,
}

async fn create_shipment(
    ctx: AuthContext,
    Validated(shipment): Validated<Shipment>,
) -> ApiOk<ShipmentAccepted> {
    ApiOk(ShipmentAccepted {
        message: "Shipment accepted",
        shipment,
        created_by: ctx.user_id,
    })
}

/// Create the shipment router.
pub fn router(state: &AppState) -> Result<Router<AppState>, SchemaError> {
    Ok(Router::new().route(
        "/api/shipments",
        GateChain::new()
            .rate_limit(DEFAULT_BUCKET)
            .authenticate(AccessPolicy::require(Role::Operator).with_admin_override())
            .validate_body(state.schema("shipment")?)
            .wrap(post(create_shipment), state),
    ))
}
