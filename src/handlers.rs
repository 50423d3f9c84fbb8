use crate::{
    AppState,
    auth::Caller,
    error::{AppError, AppResult},
    models::{
        DeleteTodoRequest, LookupParams, LookupResponse, MessageResponse, Page,
        SubscriptionUpdate, TodoPatch, UpdateRequest, total_pages,
    },
};
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
};
use chrono::Utc;

// --- Admin Resource Handlers ---
//
// Every handler re-checks the admin role through `Caller::require_admin` before any
// repository call, independently of the route guard in front of the router.

/// lookup_user
///
/// [Admin Route] Finds a user by exact email with one page (10 items, newest first) of
/// their todos. Without an email nothing is queried and an empty result is returned.
#[utoipa::path(
    get,
    path = "/api/admin",
    params(LookupParams),
    responses(
        (status = 200, description = "Lookup result", body = LookupResponse),
        (status = 400, description = "Invalid page number"),
        (status = 401, description = "Not an admin"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn lookup_user(
    caller: Caller,
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> AppResult<Json<LookupResponse>> {
    caller.require_admin()?;

    let page = Page::parse(params.page.as_deref())
        .ok_or_else(|| AppError::BadRequest("Invalid page number".to_string()))?;

    // An empty `email=` is the same as no filter.
    let email = params.email.as_deref().filter(|email| !email.is_empty());

    let (user, total_items) = match email {
        Some(email) => {
            let user = state.repo.find_user_with_todos(email, page).await?;
            let total_items = state.repo.count_todos(email).await?;
            (user, total_items)
        }
        None => (None, 0),
    };

    Ok(Json(LookupResponse {
        user,
        total_pages: total_pages(total_items),
        current_page: page.number(),
    }))
}

/// update_user
///
/// [Admin Route] Applies a subscription change and/or a todo patch. The two writes are
/// independent calls (subscription first) with no combined atomicity.
#[utoipa::path(
    put,
    path = "/api/admin",
    request_body = UpdateRequest,
    responses(
        (status = 200, description = "Updated", body = MessageResponse),
        (status = 400, description = "Malformed body or missing email"),
        (status = 401, description = "Not an admin"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn update_user(
    caller: Caller,
    State(state): State<AppState>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    caller.require_admin()?;
    let Json(payload) = payload?;

    if let Some(is_subscribed) = payload.is_subscribed {
        let email = payload
            .email
            .as_deref()
            .filter(|email| !email.is_empty())
            .ok_or_else(|| AppError::BadRequest("Email is required".to_string()))?;

        let update = SubscriptionUpdate::at(is_subscribed, Utc::now());
        state.repo.set_subscription(email, update).await?;
        tracing::info!(%email, is_subscribed, admin = %caller.user_id, "subscription updated");
    }

    if let Some(todo_id) = payload.todo_id {
        let patch = TodoPatch {
            completed: payload.todo_completed,
            // An empty title means "leave unchanged".
            title: payload.todo_title.filter(|title| !title.is_empty()),
        };
        state.repo.update_todo(todo_id, patch).await?;
        tracing::info!(%todo_id, admin = %caller.user_id, "todo updated");
    }

    Ok(Json(MessageResponse::new("Update successful")))
}

/// delete_todo
///
/// [Admin Route] Permanently deletes a todo. A missing `todoId` is rejected before the
/// repository is touched.
#[utoipa::path(
    delete,
    path = "/api/admin",
    request_body = DeleteTodoRequest,
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 400, description = "Todo ID is required"),
        (status = 401, description = "Not an admin"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn delete_todo(
    caller: Caller,
    State(state): State<AppState>,
    payload: Result<Json<DeleteTodoRequest>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    caller.require_admin()?;
    let Json(payload) = payload?;

    let todo_id = payload
        .todo_id
        .ok_or_else(|| AppError::BadRequest("Todo ID is required".to_string()))?;

    state.repo.delete_todo(todo_id).await?;
    tracing::info!(%todo_id, admin = %caller.user_id, "todo deleted");

    Ok(Json(MessageResponse::new("Todo deleted successfully")))
}
