/// Task model and database operations
///
/// This is the task repository. Every query takes the owner's user ID and
/// filters on it, so a caller can never read or mutate another user's rows.
/// Ownership and mutation happen in one statement (`WHERE id = $1 AND
/// user_id = $2`); there is no separate lookup that a concurrent writer
/// could race.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('pending', 'in_progress', 'completed');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     title VARCHAR(255) NOT NULL CHECK (length(btrim(title)) > 0),
///     description TEXT NOT NULL DEFAULT '',
///     status task_status NOT NULL DEFAULT 'pending',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use tasktrail_shared::models::task::{Task, CreateTask, UpdateTask, TaskStatus};
/// use tasktrail_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example(owner: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::from_env()?).await?;
///
/// let task = Task::create(&pool, CreateTask {
///     user_id: owner,
///     title: "Buy milk".to_string(),
///     description: String::new(),
///     status: TaskStatus::Pending,
/// }).await?;
///
/// Task::update_for_owner(&pool, task.id, owner, UpdateTask {
///     status: Some(TaskStatus::Completed),
///     ..Default::default()
/// }).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Task progress status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started (default)
    #[default]
    Pending,

    /// Being worked on
    InProgress,

    /// Done
    Completed,
}

impl TaskStatus {
    /// All accepted values, in display order
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Completed];

    /// Wire and database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown status string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid status '{0}', expected one of: pending, in_progress, completed")]
pub struct InvalidStatus(pub String);

impl FromStr for TaskStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus(s.to_string()))
    }
}

/// Task model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID
    pub id: Uuid,

    /// Owner; immutable
    pub user_id: Uuid,

    /// Non-empty title
    pub title: String,

    /// Free text, empty by default
    pub description: String,

    /// Current status
    pub status: TaskStatus,

    /// When the task was created; immutable
    pub created_at: DateTime<Utc>,

    /// Bumped on every update
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new task
#[derive(Debug, Clone)]
pub struct CreateTask {
    /// Owner
    pub user_id: Uuid,

    /// Title (must not be blank)
    pub title: String,

    /// Description
    pub description: String,

    /// Initial status
    pub status: TaskStatus,
}

/// Input for updating a task
///
/// `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    /// New title (must not be blank if present)
    pub title: Option<String>,

    /// New description
    pub description: Option<String>,

    /// New status
    pub status: Option<TaskStatus>,
}

impl UpdateTask {
    /// Whether the update carries no field at all
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.status.is_none()
    }
}

/// Whether a title is acceptable (non-empty after trimming)
pub fn is_valid_title(title: &str) -> bool {
    !title.trim().is_empty()
}

impl Task {
    /// Creates a new task with a fresh UUID
    pub async fn create(pool: &PgPool, data: CreateTask) -> Result<Self, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, user_id, title, description, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, title, description, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.user_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.status)
        .fetch_one(pool)
        .await?;

        Ok(task)
    }

    /// Lists the owner's tasks, newest first
    pub async fn list_for_owner(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, user_id, title, description, status, created_at, updated_at
            FROM tasks
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// Finds one of the owner's tasks
    ///
    /// Returns `None` both when the task does not exist and when it belongs
    /// to someone else.
    pub async fn find_for_owner(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, user_id, title, description, status, created_at, updated_at
            FROM tasks
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// Updates one of the owner's tasks
    ///
    /// Returns the updated row, or `None` if no task with that ID belongs to
    /// the owner (in which case nothing was written).
    pub async fn update_for_owner(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                status = COALESCE($5, status),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, description, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.status)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// Hard-deletes one of the owner's tasks
    ///
    /// Returns `false` if no task with that ID belongs to the owner.
    pub async fn delete_for_owner(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
