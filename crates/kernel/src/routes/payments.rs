//! Payment routes.

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
#[serde(rename_all = "snake_case")]
enum PaymentMode {
    Cash,
    BankTransfer,
    Upi,
    Cheque,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payment {
    invoice_id: Uuid,
    amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_date: Option<String>,
    payment_mode: PaymentMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRecorded {
    message: &'static str,
    payment: Payment,
    recorded_by: Uuid,
}

async fn record_payment(
    ctx: AuthContext,
    Validated(payment): Validated<Payment>,
) -> ApiOk<PaymentRecorded> {
    ApiOk(PaymentRecorded {
        message: "Payment accepted",
        payment,
        recorded_by: ctx.user_id,
    })
}

/// Create the payment router. Recording payments is admin-only.
pub fn router(state: &AppState) -> Result<Router<AppState>, SchemaError> {
    Ok(Router::new().route(
        "/api/payments",
        GateChain::new()
            .rate_limit(DEFAULT_BUCKET)
            .authenticate(AccessPolicy::require(Role::Admin))
            .validate_body(state.schema("payment")?)
            .wrap(post(record_payment), state),
    ))
}
