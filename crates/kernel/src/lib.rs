//! Tapango gateway kernel library.
//!
//! Request gates (rate limiting, authentication, validation), the routes
//! they protect, and the state they share. The `tapango` binary wires
//! these to configuration and a listener.

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod schema;
pub mod services;
pub mod session;
pub mod state;

use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult, ErrorKind};
pub use state::{AppState, AppStateBuilder};

/// Build the application router.
///
/// Panics anywhere below this point are answered with the internal error
/// envelope.
pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let routes = routes::router(&state)?;

    Ok(routes
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
