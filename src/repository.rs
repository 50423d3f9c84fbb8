use crate::models::{Page, SubscriptionUpdate, Todo, TodoPatch, User, UserWithTodos};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;
use uuid::Uuid;

/// StoreError
///
/// Failures surfaced by the persistence layer. Handlers never inspect the variant; every
/// store error is reported to the client as a generic internal error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A targeted write matched no row.
    #[error("{0} not found")]
    NotFound(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository Trait
///
/// Abstract contract for all persistence operations used by the admin console and the
/// registration webhook. Handlers only see `Arc<dyn Repository>`, so tests substitute
/// `MockRepository`.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Finds a user by exact email, including one page of their todos (newest first).
    async fn find_user_with_todos(&self, email: &str, page: Page) -> StoreResult<Option<UserWithTodos>>;
    /// Counts all todos owned by the user with this email.
    async fn count_todos(&self, email: &str) -> StoreResult<i64>;
    /// Writes the subscription flag and expiry of the user with this email.
    async fn set_subscription(&self, email: &str, update: SubscriptionUpdate) -> StoreResult<()>;
    /// Applies a field-level patch to a todo.
    async fn update_todo(&self, id: Uuid, patch: TodoPatch) -> StoreResult<()>;
    /// Permanently deletes a todo.
    async fn delete_todo(&self, id: Uuid) -> StoreResult<()>;
    /// Creates the user mirrored from the identity provider, or refreshes its email.
    async fn upsert_user(&self, id: &str, email: &str) -> StoreResult<User>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// find_user_with_todos
    ///
    /// Two reads: the user row by its unique email, then the requested page of todos using
    /// `LIMIT`/`OFFSET` over `created_at DESC`.
    async fn find_user_with_todos(&self, email: &str, page: Page) -> StoreResult<Option<UserWithTodos>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, is_subscribed, subscription_ends FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(user) = user else {
            return Ok(None);
        };

        let todos = sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, title, completed, user_id, created_at, updated_at
            FROM todos
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&user.id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(UserWithTodos::new(user, todos)))
    }

    async fn count_todos(&self, email: &str) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM todos t JOIN users u ON t.user_id = u.id WHERE u.email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn set_subscription(&self, email: &str, update: SubscriptionUpdate) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET is_subscribed = $2, subscription_ends = $3 WHERE email = $1",
        )
        .bind(email)
        .bind(update.is_subscribed)
        .bind(update.subscription_ends)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    /// update_todo
    ///
    /// Uses `COALESCE` so that a `None` field keeps the current column value.
    async fn update_todo(&self, id: Uuid, patch: TodoPatch) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE todos
            SET completed = COALESCE($2, completed),
                title = COALESCE($3, title),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.completed)
        .bind(patch.title)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("todo"));
        }
        Ok(())
    }

    async fn delete_todo(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("todo"));
        }
        Ok(())
    }

    async fn upsert_user(&self, id: &str, email: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, is_subscribed, subscription_ends
            "#,
        )
        .bind(id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
}

// --- In-Memory Implementation (For Tests) ---

/// MockRepository
///
/// In-memory `Repository` used by unit and integration tests. Every trait call increments
/// `calls`, which lets tests assert that rejected requests never reach the store.
#[derive(Default)]
pub struct MockRepository {
    users: Mutex<Vec<User>>,
    todos: Mutex<Vec<Todo>>,
    calls: AtomicUsize,
    /// When true, every operation fails with a database error.
    pub should_fail: bool,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_user(self, user: User) -> Self {
        self.users.lock().unwrap().push(user);
        self
    }

    pub fn with_todo(self, todo: Todo) -> Self {
        self.todos.lock().unwrap().push(todo);
        self
    }

    /// Number of trait calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn user(&self, email: &str) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.email == email).cloned()
    }

    pub fn todo(&self, id: Uuid) -> Option<Todo> {
        self.todos.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    fn record(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn find_user_with_todos(&self, email: &str, page: Page) -> StoreResult<Option<UserWithTodos>> {
        self.record()?;
        let Some(user) = self.user(email) else {
            return Ok(None);
        };

        let mut todos: Vec<Todo> = self
            .todos
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user.id)
            .cloned()
            .collect();
        todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let page_todos = todos
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(Some(UserWithTodos::new(user, page_todos)))
    }

    async fn count_todos(&self, email: &str) -> StoreResult<i64> {
        self.record()?;
        let Some(user) = self.user(email) else {
            return Ok(0);
        };
        let count = self
            .todos
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user.id)
            .count();
        Ok(count as i64)
    }

    async fn set_subscription(&self, email: &str, update: SubscriptionUpdate) -> StoreResult<()> {
        self.record()?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.email == email)
            .ok_or(StoreError::NotFound("user"))?;
        user.is_subscribed = update.is_subscribed;
        user.subscription_ends = update.subscription_ends;
        Ok(())
    }

    async fn update_todo(&self, id: Uuid, patch: TodoPatch) -> StoreResult<()> {
        self.record()?;
        let mut todos = self.todos.lock().unwrap();
        let todo = todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound("todo"))?;
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }
        if let Some(title) = patch.title {
            todo.title = title;
        }
        todo.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn delete_todo(&self, id: Uuid) -> StoreResult<()> {
        self.record()?;
        let mut todos = self.todos.lock().unwrap();
        let before = todos.len();
        todos.retain(|t| t.id != id);
        if todos.len() == before {
            return Err(StoreError::NotFound("todo"));
        }
        Ok(())
    }

    async fn upsert_user(&self, id: &str, email: &str) -> StoreResult<User> {
        self.record()?;
        let mut users = self.users.lock().unwrap();
        if let Some(existing) = users.iter_mut().find(|u| u.id == id) {
            existing.email = email.to_string();
            return Ok(existing.clone());
        }
        let user = User {
            id: id.to_string(),
            email: email.to_string(),
            ..User::default()
        };
        users.push(user.clone());
        Ok(user)
    }
}
