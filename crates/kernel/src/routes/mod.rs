//! HTTP route handlers.

pub mod customers;
pub mod health;
pub mod invoices;
pub mod metrics;
pub mod payments;
pub mod protected;
pub mod rate_limit_demo;
pub mod shipments;
pub mod simulation;
pub mod track;

use axum::Router;

use crate::schema::SchemaError;
use crate::state::AppState;

/// All API routes, with their gates applied.
pub fn router(state: &AppState) -> Result<Router<AppState>, SchemaError> {
    Ok(Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .merge(protected::router(state)?)
        .merge(rate_limit_demo::router(state))
        .merge(customers::router(state)?)
        .merge(invoices::router(state)?)
        .merge(payments::router(state)?)
        .merge(shipments::router(state)?)
        .merge(simulation::router(state)?)
        .merge(track::router(state)?))
}
