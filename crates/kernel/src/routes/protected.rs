//! Authentication demonstration routes.

use axum::Router;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{GateChain, Validated};
use crate::models::{AccessPolicy, AuthContext, Role};
use crate::response::ApiOk;
use crate::schema::SchemaError;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessGranted {
    message: &'static str,
    user_id: Uuid,
    user_role: Role,
}

impl AccessGranted {
    fn new(message: &'static str, ctx: &AuthContext) -> Self {
        Self {
            message,
            user_id: ctx.user_id,
            user_role: ctx.user_role,
        }
    }
}

/// Any authenticated user.
async fn protected_resource(ctx: AuthContext) -> ApiOk<AccessGranted> {
    ApiOk(AccessGranted::new("Protected endpoint accessed", &ctx))
}

/// Operators (and admins).
async fn operator_only(ctx: AuthContext) -> ApiOk<AccessGranted> {
    ApiOk(AccessGranted::new("Operator access granted", &ctx))
}

#[derive(Deserialize)]
struct Ping {
    action: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PingAccepted {
    #[serde(flatten)]
    granted: AccessGranted,
    action: String,
}

async fn auth_and_validation(
    ctx: AuthContext,
    Validated(ping): Validated<Ping>,
) -> ApiOk<PingAccepted> {
    ApiOk(PingAccepted {
        granted: AccessGranted::new("Authentication and validation passed", &ctx),
        action: ping.action,
    })
}

#[derive(Serialize)]
struct Usage {
    info: &'static str,
}

/// Describes the POST contract instead of answering 405.
async fn auth_and_validation_usage() -> ApiOk<Usage> {
    ApiOk(Usage {
        info: "POST JSON { \"action\": \"ping\" } with a valid session to exercise auth and validation.",
    })
}

/// Create the protected routes.
pub fn router(state: &AppState) -> Result<Router<AppState>, SchemaError> {
    let ping = state.schema("ping")?;

    Ok(Router::new()
        .route(
            "/api/protected/resource",
            GateChain::new()
                .authenticate(AccessPolicy::authenticated())
                .wrap(get(protected_resource), state),
        )
        .route(
            "/api/operator-only",
            GateChain::new()
                .authenticate(AccessPolicy::require(Role::Operator).with_admin_override())
                .wrap(get(operator_only), state),
        )
        .route(
            "/api/auth/protected",
            GateChain::new()
                .authenticate(AccessPolicy::authenticated())
                .validate_body(ping)
                .wrap(post(auth_and_validation), state)
                .get(auth_and_validation_usage),
        ))
}
