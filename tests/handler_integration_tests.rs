use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use todo_admin::{
    AppError, AppState, MockIdentityProvider,
    auth::{Caller, Role},
    config::AppConfig,
    handlers,
    models::{DeleteTodoRequest, LookupParams, Todo, UpdateRequest, User},
    repository::MockRepository,
};
use uuid::Uuid;

// --- TEST UTILITIES ---

const EMAIL: &str = "a@b.com";
const OWNER_ID: &str = "user_owner";

fn create_test_state(repo: Arc<MockRepository>) -> AppState {
    AppState {
        repo,
        identity: Arc::new(MockIdentityProvider::new()),
        config: AppConfig::default(),
    }
}

fn admin_caller() -> Caller {
    Caller {
        user_id: "user_admin".to_string(),
        role: Role::Admin,
    }
}

fn standard_caller() -> Caller {
    Caller {
        user_id: "user_member".to_string(),
        role: Role::Standard,
    }
}

fn owner() -> User {
    User {
        id: OWNER_ID.to_string(),
        email: EMAIL.to_string(),
        is_subscribed: false,
        subscription_ends: None,
    }
}

/// `todo {n}` created `n` minutes after a fixed base time; a larger `n` is more recent.
fn todo(n: i64) -> Todo {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(n);
    Todo {
        id: Uuid::from_u128(n as u128),
        title: format!("todo {n}"),
        completed: false,
        user_id: OWNER_ID.to_string(),
        created_at,
        updated_at: created_at,
    }
}

fn repo_with_todos(count: i64) -> MockRepository {
    (1..=count).fold(MockRepository::new().with_user(owner()), |repo, n| {
        repo.with_todo(todo(n))
    })
}

fn lookup(email: Option<&str>, page: Option<&str>) -> Query<LookupParams> {
    Query(LookupParams {
        email: email.map(str::to_string),
        page: page.map(str::to_string),
    })
}

async fn error_body(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    (parts.status, serde_json::from_slice(&bytes).unwrap())
}

// --- LOOKUP ---

#[tokio::test]
async fn test_lookup_without_email_returns_empty_result() {
    let repo = Arc::new(repo_with_todos(3));
    let state = create_test_state(repo.clone());

    let Json(response) = handlers::lookup_user(admin_caller(), State(state), lookup(None, Some("3")))
        .await
        .unwrap();

    assert!(response.user.is_none());
    assert_eq!(response.total_pages, 0);
    assert_eq!(response.current_page, 3);
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn test_lookup_empty_email_is_treated_as_absent() {
    let repo = Arc::new(repo_with_todos(3));
    let state = create_test_state(repo.clone());

    let Json(response) = handlers::lookup_user(admin_caller(), State(state), lookup(Some(""), None))
        .await
        .unwrap();

    assert!(response.user.is_none());
    assert_eq!(response.current_page, 1);
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn test_lookup_second_page_returns_oldest_five() {
    let repo = Arc::new(repo_with_todos(15));
    let state = create_test_state(repo.clone());

    let Json(response) =
        handlers::lookup_user(admin_caller(), State(state), lookup(Some(EMAIL), Some("2")))
            .await
            .unwrap();

    let user = response.user.expect("user should be found");
    let titles: Vec<&str> = user.todos.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["todo 5", "todo 4", "todo 3", "todo 2", "todo 1"]);
    assert_eq!(response.total_pages, 2);
    assert_eq!(response.current_page, 2);
}

#[tokio::test]
async fn test_lookup_first_page_is_default_and_newest_first() {
    let repo = Arc::new(repo_with_todos(15));
    let state = create_test_state(repo.clone());

    let Json(response) = handlers::lookup_user(admin_caller(), State(state), lookup(Some(EMAIL), None))
        .await
        .unwrap();

    let user = response.user.unwrap();
    assert_eq!(user.email, EMAIL);
    assert_eq!(user.todos.len(), 10);
    assert_eq!(user.todos[0].title, "todo 15");
    assert_eq!(user.todos[9].title, "todo 6");
    assert_eq!(response.current_page, 1);
}

#[tokio::test]
async fn test_lookup_unknown_email_returns_null_user() {
    let repo = Arc::new(repo_with_todos(2));
    let state = create_test_state(repo.clone());

    let Json(response) =
        handlers::lookup_user(admin_caller(), State(state), lookup(Some("nobody@x.com"), None))
            .await
            .unwrap();

    assert!(response.user.is_none());
    assert_eq!(response.total_pages, 0);
}

#[tokio::test]
async fn test_lookup_rejects_malformed_page() {
    for raw in ["abc", "0", "-1", "1.5", "9223372036854775807"] {
        let repo = Arc::new(repo_with_todos(2));
        let state = create_test_state(repo.clone());

        let err = handlers::lookup_user(admin_caller(), State(state), lookup(Some(EMAIL), Some(raw)))
            .await
            .unwrap_err();

        let (status, body) = error_body(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "page {raw}");
        assert_eq!(body["error"], "Invalid page number");
        assert_eq!(repo.calls(), 0);
    }
}

#[tokio::test]
async fn test_lookup_store_failure_is_internal_error() {
    let repo = Arc::new(MockRepository::new_failing());
    let state = create_test_state(repo.clone());

    let err = handlers::lookup_user(admin_caller(), State(state), lookup(Some(EMAIL), None))
        .await
        .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal Server Error");
}

// --- UPDATE ---

#[tokio::test]
async fn test_update_subscribe_sets_thirty_day_expiry() {
    let repo = Arc::new(repo_with_todos(0));
    let state = create_test_state(repo.clone());

    let before = Utc::now();
    let Json(message) = handlers::update_user(
        admin_caller(),
        State(state),
        Ok(Json(UpdateRequest {
            email: Some(EMAIL.to_string()),
            is_subscribed: Some(true),
            ..UpdateRequest::default()
        })),
    )
    .await
    .unwrap();
    let after = Utc::now();

    assert_eq!(message.message, "Update successful");
    let user = repo.user(EMAIL).unwrap();
    assert!(user.is_subscribed);
    let ends = user.subscription_ends.expect("expiry must be set");
    assert!(ends >= before + Duration::milliseconds(30 * 24 * 3600 * 1000));
    assert!(ends <= after + Duration::milliseconds(30 * 24 * 3600 * 1000));
}

#[tokio::test]
async fn test_update_unsubscribe_clears_expiry() {
    let subscribed = User {
        is_subscribed: true,
        subscription_ends: Some(Utc::now() + Duration::days(12)),
        ..owner()
    };
    let repo = Arc::new(MockRepository::new().with_user(subscribed));
    let state = create_test_state(repo.clone());

    handlers::update_user(
        admin_caller(),
        State(state),
        Ok(Json(UpdateRequest {
            email: Some(EMAIL.to_string()),
            is_subscribed: Some(false),
            ..UpdateRequest::default()
        })),
    )
    .await
    .unwrap();

    let user = repo.user(EMAIL).unwrap();
    assert!(!user.is_subscribed);
    assert!(user.subscription_ends.is_none());
}

#[tokio::test]
async fn test_update_title_only_keeps_completed() {
    let mut done = todo(1);
    done.completed = true;
    let repo = Arc::new(MockRepository::new().with_user(owner()).with_todo(done));
    let state = create_test_state(repo.clone());

    handlers::update_user(
        admin_caller(),
        State(state),
        Ok(Json(UpdateRequest {
            email: Some(EMAIL.to_string()),
            todo_id: Some(Uuid::from_u128(1)),
            todo_title: Some("renamed".to_string()),
            ..UpdateRequest::default()
        })),
    )
    .await
    .unwrap();

    let updated = repo.todo(Uuid::from_u128(1)).unwrap();
    assert_eq!(updated.title, "renamed");
    assert!(updated.completed);
    // Subscription untouched when the flag is absent.
    assert!(!repo.user(EMAIL).unwrap().is_subscribed);
    assert_eq!(repo.calls(), 1);
}

#[tokio::test]
async fn test_update_completed_only_keeps_title() {
    let repo = Arc::new(repo_with_todos(1));
    let state = create_test_state(repo.clone());

    handlers::update_user(
        admin_caller(),
        State(state),
        Ok(Json(UpdateRequest {
            todo_id: Some(Uuid::from_u128(1)),
            todo_completed: Some(true),
            // Empty title is the same as no title.
            todo_title: Some(String::new()),
            ..UpdateRequest::default()
        })),
    )
    .await
    .unwrap();

    let updated = repo.todo(Uuid::from_u128(1)).unwrap();
    assert!(updated.completed);
    assert_eq!(updated.title, "todo 1");
}

#[tokio::test]
async fn test_update_subscription_without_email_is_bad_request() {
    let repo = Arc::new(repo_with_todos(0));
    let state = create_test_state(repo.clone());

    let err = handlers::update_user(
        admin_caller(),
        State(state),
        Ok(Json(UpdateRequest {
            is_subscribed: Some(true),
            ..UpdateRequest::default()
        })),
    )
    .await
    .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email is required");
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn test_update_missing_todo_is_internal_error() {
    let repo = Arc::new(repo_with_todos(0));
    let state = create_test_state(repo.clone());

    let err = handlers::update_user(
        admin_caller(),
        State(state),
        Ok(Json(UpdateRequest {
            todo_id: Some(Uuid::new_v4()),
            todo_completed: Some(true),
            ..UpdateRequest::default()
        })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_update_unknown_email_is_internal_error() {
    let repo = Arc::new(repo_with_todos(0));
    let state = create_test_state(repo.clone());

    let err = handlers::update_user(
        admin_caller(),
        State(state),
        Ok(Json(UpdateRequest {
            email: Some("ghost@x.com".to_string()),
            is_subscribed: Some(true),
            ..UpdateRequest::default()
        })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

// --- DELETE ---

#[tokio::test]
async fn test_delete_todo_success() {
    let repo = Arc::new(repo_with_todos(2));
    let state = create_test_state(repo.clone());

    let Json(message) = handlers::delete_todo(
        admin_caller(),
        State(state),
        Ok(Json(DeleteTodoRequest {
            todo_id: Some(Uuid::from_u128(2)),
        })),
    )
    .await
    .unwrap();

    assert_eq!(message.message, "Todo deleted successfully");
    assert!(repo.todo(Uuid::from_u128(2)).is_none());
    assert!(repo.todo(Uuid::from_u128(1)).is_some());
}

#[tokio::test]
async fn test_delete_without_todo_id_is_bad_request() {
    let repo = Arc::new(repo_with_todos(2));
    let state = create_test_state(repo.clone());

    let err = handlers::delete_todo(
        admin_caller(),
        State(state),
        Ok(Json(DeleteTodoRequest::default())),
    )
    .await
    .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Todo ID is required");
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn test_delete_missing_todo_is_internal_error() {
    let repo = Arc::new(repo_with_todos(0));
    let state = create_test_state(repo.clone());

    let err = handlers::delete_todo(
        admin_caller(),
        State(state),
        Ok(Json(DeleteTodoRequest {
            todo_id: Some(Uuid::new_v4()),
        })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

// --- AUTHORIZATION ---

#[tokio::test]
async fn test_non_admin_is_rejected_without_store_access() {
    let repo = Arc::new(repo_with_todos(3));

    let lookup_err = handlers::lookup_user(
        standard_caller(),
        State(create_test_state(repo.clone())),
        lookup(Some(EMAIL), None),
    )
    .await
    .unwrap_err();

    let update_err = handlers::update_user(
        standard_caller(),
        State(create_test_state(repo.clone())),
        Ok(Json(UpdateRequest {
            email: Some(EMAIL.to_string()),
            is_subscribed: Some(true),
            todo_id: Some(Uuid::from_u128(1)),
            todo_completed: Some(true),
            ..UpdateRequest::default()
        })),
    )
    .await
    .unwrap_err();

    let delete_err = handlers::delete_todo(
        standard_caller(),
        State(create_test_state(repo.clone())),
        Ok(Json(DeleteTodoRequest {
            todo_id: Some(Uuid::from_u128(1)),
        })),
    )
    .await
    .unwrap_err();

    for err in [lookup_err, update_err, delete_err] {
        let (status, body) = error_body(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }
    assert_eq!(repo.calls(), 0);
}
