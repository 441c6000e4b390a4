//! Invoice routes.

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
enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    PartiallyPaid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    shipment_id: Option<String>,
    description: String,
    amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    weight: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Invoice {
    invoice_ref: String,
    customer_id: String,
    amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
    status: InvoiceStatus,
    #[serde(default)]
    items: Vec<LineItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceAccepted {
    message: &'static str,
    invoice: Invoice,
    created_by: Uuid,
}

async fn create_invoice(
    ctx: AuthContext,
    Validated(invoice): Validated<Invoice>,
) -> ApiOk<InvoiceAccepted> {
    ApiOk(InvoiceAccepted {
        message: "Invoice accepted",
        invoice,
        created_by: ctx.user_id,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueInvoice {
    invoice_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceQueued {
    message: &'static str,
    job_id: Uuid,
    invoice_id: Uuid,
    estimated_time: &'static str,
    queued_by: Uuid,
}

/// Hands PDF generation to the background; the job id identifies it.
async fn queue_invoice(
    ctx: AuthContext,
    Validated(request): Validated<QueueInvoice>,
) -> ApiOk<InvoiceQueued> {
    let job_id = Uuid::now_v7();
    tracing::info!(%job_id, invoice_id = %request.invoice_id, "invoice generation queued");

    ApiOk(InvoiceQueued {
        message: "Invoice generation queued",
        job_id,
        invoice_id: request.invoice_id,
        estimated_time: "1-2 minutes",
        queued_by: ctx.user_id,
    })
}

/// Create the invoice router.
pub fn router(state: &AppState) -> Result<Router<AppState>, SchemaError> {
    Ok(Router::new()
        .route(
            "/api/invoices",
            GateChain::new()
                .rate_limit(DEFAULT_BUCKET)
                .authenticate(AccessPolicy::require(Role::Operator).with_admin_override())
                .validate_body(state.schema("invoice")?)
                .wrap(post(create_invoice), state),
        )
        .route(
            "/api/invoices/queue",
            GateChain::new()
                .rate_limit(DEFAULT_BUCKET)
                .authenticate(AccessPolicy::allow([Role::Admin, Role::Operator]))
                .validate_body(state.schema("queue_invoice")?)
                .wrap(post(queue_invoice), state),
        ))
}
