//! Customer routes.

use axum::Router;
use axum::routing::post;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{DEFAULT_BUCKET, GateChain, Validated};
use crate::models::{AccessPolicy, AuthContext, Role};
use crate::response::ApiOk;
use crate::schema::SchemaError;
use crate::state::AppState;

/// Partial customer update as accepted by the `customer_update` schema.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerUpdate {
    id: Uuid,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    city: Option<String>,
}

/// Changes to apply. Blank optional strings clear the column.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerChanges {
    id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<Option<String>>,
}

fn blank_to_none(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl From<CustomerUpdate> for CustomerChanges {
    fn from(update: CustomerUpdate) -> Self {
        Self {
            id: update.id,
            name: update.name.map(|n| n.trim().to_string()),
            email: blank_to_none(update.email),
            phone: blank_to_none(update.phone),
            city: blank_to_none(update.city),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerUpdated {
    customer: CustomerChanges,
    updated_by: Uuid,
}

async fn update_customer(
    ctx: AuthContext,
    Validated(update): Validated<CustomerUpdate>,
) -> ApiOk<CustomerUpdated> {
    ApiOk(CustomerUpdated {
        customer: update.into(),
        updated_by: ctx.user_id,
    })
}

/// Create the customer router.
pub fn router(state: &AppState) -> Result<Router<AppState>, SchemaError> {
    Ok(Router::new().route(
        "/api/customers/update",
        GateChain::new()
            .rate_limit(DEFAULT_BUCKET)
            .authenticate(AccessPolicy::require(Role::Operator).with_admin_override())
            .validate_body(state.schema("customer_update")?)
            .wrap(post(update_customer), state),
    ))
}
