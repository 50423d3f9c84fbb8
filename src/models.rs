use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// Number of todos returned per lookup page.
pub const TODOS_PER_PAGE: i64 = 10;

/// Length of a subscription from the moment it is activated.
pub fn subscription_period() -> Duration {
    Duration::days(30)
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A row of the `users` table. `id` is the identity provider's user id, `email` is the
/// unique lookup key used by the admin console.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: String,
    pub email: String,
    pub is_subscribed: bool,
    #[ts(type = "string | null")]
    pub subscription_ends: Option<DateTime<Utc>>,
}

/// Todo
///
/// A row of the `todos` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Todo {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
    pub user_id: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// UserWithTodos
///
/// A user together with one page of their todos, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserWithTodos {
    pub id: String,
    pub email: String,
    pub is_subscribed: bool,
    #[ts(type = "string | null")]
    pub subscription_ends: Option<DateTime<Utc>>,
    pub todos: Vec<Todo>,
}

impl UserWithTodos {
    pub fn new(user: User, todos: Vec<Todo>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            is_subscribed: user.is_subscribed,
            subscription_ends: user.subscription_ends,
            todos,
        }
    }
}

// --- Write Models (Repository Inputs) ---

/// SubscriptionUpdate
///
/// The only way to build a subscription write. The expiry is derived from the flag, so a
/// subscribed user always has an expiry and an unsubscribed one never does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionUpdate {
    pub is_subscribed: bool,
    pub subscription_ends: Option<DateTime<Utc>>,
}

impl SubscriptionUpdate {
    pub fn at(is_subscribed: bool, now: DateTime<Utc>) -> Self {
        Self {
            is_subscribed,
            subscription_ends: is_subscribed.then(|| now + subscription_period()),
        }
    }
}

/// TodoPatch
///
/// Field-level todo update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoPatch {
    pub completed: Option<bool>,
    pub title: Option<String>,
}

/// Page
///
/// A validated, 1-based page of todos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page(i64);

impl Page {
    pub const FIRST: Page = Page(1);

    /// Accepts positive integers whose offset fits in an `i64`.
    pub fn new(number: i64) -> Option<Self> {
        if number < 1 {
            return None;
        }
        (number - 1).checked_mul(TODOS_PER_PAGE)?;
        Some(Page(number))
    }

    /// Parses the raw `page` query value. Absent means the first page.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw {
            None => Some(Page::FIRST),
            Some(value) => value.trim().parse::<i64>().ok().and_then(Page::new),
        }
    }

    pub fn number(self) -> i64 {
        self.0
    }

    pub fn limit(self) -> i64 {
        TODOS_PER_PAGE
    }

    pub fn offset(self) -> i64 {
        (self.0 - 1) * TODOS_PER_PAGE
    }
}

/// Ceiling division of an item count into pages of `TODOS_PER_PAGE`.
pub fn total_pages(total_items: i64) -> i64 {
    if total_items <= 0 {
        return 0;
    }
    (total_items + TODOS_PER_PAGE - 1) / TODOS_PER_PAGE
}

// --- Request Payloads (Input Schemas) ---

/// LookupParams
///
/// Query string of `GET /api/admin`. `page` is kept raw so malformed values can be answered
/// with a JSON 400 instead of the framework's query rejection.
#[derive(Debug, Clone, Deserialize, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LookupParams {
    /// Exact-match email filter.
    pub email: Option<String>,
    /// 1-based page number, defaults to 1.
    pub page: Option<String>,
}

/// UpdateRequest
///
/// Body of `PUT /api/admin`. Every field except `email` is optional and only applied when
/// present.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_subscribed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_title: Option<String>,
}

/// DeleteTodoRequest
///
/// Body of `DELETE /api/admin`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeleteTodoRequest {
    #[serde(default)]
    pub todo_id: Option<Uuid>,
}

// --- Response Schemas (Output) ---

/// LookupResponse
///
/// Output of `GET /api/admin`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LookupResponse {
    pub user: Option<UserWithTodos>,
    pub total_pages: i64,
    pub current_page: i64,
}

/// MessageResponse
///
/// Acknowledgement returned by write operations.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
