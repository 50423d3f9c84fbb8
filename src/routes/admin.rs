use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// The admin resource endpoints. All three methods share one path and each handler
/// verifies the `admin` role before touching the repository.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/admin?email=...&page=...   paginated user + todo lookup
        // PUT /api/admin                      subscription and todo field updates
        // DELETE /api/admin                   permanent todo deletion
        .route(
            "/api/admin",
            get(handlers::lookup_user)
                .put(handlers::update_user)
                .delete(handlers::delete_todo),
        )
}
