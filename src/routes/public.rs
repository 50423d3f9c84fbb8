use crate::{AppState, webhook};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no session. `/health` is skipped by the route guard entirely;
/// `/api/webhook/register` is in the guard's public route set and authenticates each call
/// by its signature instead.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /api/webhook/register
        // Signed `user.created` events from the identity provider.
        .route("/api/webhook/register", post(webhook::register_user))
}
