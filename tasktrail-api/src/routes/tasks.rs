/// Task endpoints
///
/// Every route sits behind the access guard and is scoped to the caller. A
/// task owned by someone else is indistinguishable from a missing one: both
/// answer 404 `Task not found`, as does a path ID that is not a UUID.
///
/// # Endpoints
///
/// - `GET    /tasks`      - List the caller's tasks, newest first
/// - `POST   /tasks`      - Create a task
/// - `GET    /tasks/:id`  - Fetch one task
/// - `PUT    /tasks/:id`  - Update title, description and/or status
/// - `DELETE /tasks/:id`  - Delete a task

use crate::{
    app::AppState,
    error::{ApiError, ApiJson, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tasktrail_shared::{
    activity::{ActivityAction, ActivityEntry},
    auth::guard::AuthContext,
    models::task::{is_valid_title, CreateTask, Task, TaskStatus, UpdateTask},
};
use uuid::Uuid;
use validator::Validate;

const TASK_NOT_FOUND: &str = "Task not found";
const TITLE_REQUIRED: &str = "Title is required";
const NUL_IN_TEXT: &str = "Text fields must not contain NUL characters";

/// Create task request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    /// Title (required, non-blank)
    #[validate(length(max = 255, message = "Title must be at most 255 characters"))]
    pub title: Option<String>,

    /// Description (default empty)
    pub description: Option<String>,

    /// `pending`, `in_progress` or `completed` (default `pending`)
    pub status: Option<String>,
}

/// Update task request; absent fields keep their value
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    /// New title (non-blank if present)
    #[validate(length(max = 255, message = "Title must be at most 255 characters"))]
    pub title: Option<String>,

    /// New description
    pub description: Option<String>,

    /// New status
    pub status: Option<String>,
}

/// Task list response
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskListResponse {
    /// The caller's tasks, newest first
    pub tasks: Vec<Task>,
}

/// Single task response
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResponse {
    /// The task
    pub task: Task,
}

/// Task created response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreatedResponse {
    /// Confirmation message
    pub message: String,

    /// New task ID
    pub task_id: Uuid,
}

/// Plain confirmation response
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Confirmation message
    pub message: String,
}

impl CreateTaskRequest {
    fn into_create(self, user_id: Uuid) -> ApiResult<CreateTask> {
        self.validate()?;

        let title = self.title.unwrap_or_default();
        if !is_valid_title(&title) {
            return Err(ApiError::Validation(TITLE_REQUIRED.to_string()));
        }
        reject_nul([Some(title.as_str()), self.description.as_deref()])?;

        Ok(CreateTask {
            user_id,
            title: title.trim().to_string(),
            description: self.description.unwrap_or_default(),
            status: parse_status(self.status.as_deref())?.unwrap_or_default(),
        })
    }
}

impl UpdateTaskRequest {
    fn into_update(self) -> ApiResult<UpdateTask> {
        self.validate()?;
        reject_nul([self.title.as_deref(), self.description.as_deref()])?;

        let title = match self.title {
            Some(title) if !is_valid_title(&title) => {
                return Err(ApiError::Validation(TITLE_REQUIRED.to_string()));
            }
            Some(title) => Some(title.trim().to_string()),
            None => None,
        };

        Ok(UpdateTask {
            title,
            description: self.description,
            status: parse_status(self.status.as_deref())?,
        })
    }
}

// Postgres text cannot hold NUL
fn reject_nul<'a>(fields: impl IntoIterator<Item = Option<&'a str>>) -> ApiResult<()> {
    if fields.into_iter().flatten().any(|s| s.contains('\0')) {
        return Err(ApiError::Validation(NUL_IN_TEXT.to_string()));
    }
    Ok(())
}

fn parse_status(raw: Option<&str>) -> ApiResult<Option<TaskStatus>> {
    raw.map(|s| s.parse::<TaskStatus>())
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

// Non-UUID IDs cannot name any task
fn parse_task_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(TASK_NOT_FOUND.to_string()))
}

fn not_found() -> ApiError {
    ApiError::NotFound(TASK_NOT_FOUND.to_string())
}

/// List the caller's tasks
///
/// ```text
/// GET /tasks
/// Authorization: Bearer eyJ...
/// ```
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<TaskListResponse>> {
    let tasks = Task::list_for_owner(&state.db, auth.user_id)
        .await
        .map_err(ApiError::storage("Failed to fetch tasks"))?;

    state.activity.record(
        ActivityEntry::new(ActivityAction::TasksFetched)
            .user(auth.user_id, &auth.email)
            .count(tasks.len()),
    );

    Ok(Json(TaskListResponse { tasks }))
}

/// Fetch one of the caller's tasks
pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskResponse>> {
    let id = parse_task_id(&id)?;

    let task = Task::find_for_owner(&state.db, id, auth.user_id)
        .await
        .map_err(ApiError::storage("Failed to fetch task"))?
        .ok_or_else(not_found)?;

    Ok(Json(TaskResponse { task }))
}

/// Create a task
///
/// ```text
/// POST /tasks
/// {"title": "Buy milk", "description": "2 litres", "status": "pending"}
/// ```
///
/// ```json
/// {"message": "Task created", "taskId": "uuid"}
/// ```
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskCreatedResponse>)> {
    let data = req.into_create(auth.user_id)?;

    let task = Task::create(&state.db, data)
        .await
        .map_err(ApiError::storage("Failed to create task"))?;

    state.activity.record(
        ActivityEntry::new(ActivityAction::TaskCreated)
            .user(auth.user_id, &auth.email)
            .task(task.id),
    );

    Ok((
        StatusCode::CREATED,
        Json(TaskCreatedResponse {
            message: "Task created".to_string(),
            task_id: task.id,
        }),
    ))
}

/// Update one of the caller's tasks
///
/// The ownership check and the write are a single statement, so a task
/// owned by someone else is never touched.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_task_id(&id)?;
    let data = req.into_update()?;

    let task = Task::update_for_owner(&state.db, id, auth.user_id, data)
        .await
        .map_err(ApiError::storage("Failed to update task"))?
        .ok_or_else(not_found)?;

    state.activity.record(
        ActivityEntry::new(ActivityAction::TaskUpdated)
            .user(auth.user_id, &auth.email)
            .task(task.id),
    );

    Ok(Json(MessageResponse {
        message: "Task updated".to_string(),
    }))
}

/// Delete one of the caller's tasks
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_task_id(&id)?;

    let deleted = Task::delete_for_owner(&state.db, id, auth.user_id)
        .await
        .map_err(ApiError::storage("Failed to delete task"))?;

    if !deleted {
        return Err(not_found());
    }

    state.activity.record(
        ActivityEntry::new(ActivityAction::TaskDeleted)
            .user(auth.user_id, &auth.email)
            .task(id),
    );

    Ok(Json(MessageResponse {
        message: "Task deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_req(json: &str) -> CreateTaskRequest {
        serde_json::from_str(json).unwrap()
    }

    fn update_req(json: &str) -> UpdateTaskRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_create_defaults() {
        let owner = Uuid::new_v4();
        let data = create_req(r#"{"title": "Buy milk"}"#).into_create(owner).unwrap();

        assert_eq!(data.user_id, owner);
        assert_eq!(data.title, "Buy milk");
        assert_eq!(data.description, "");
        assert_eq!(data.status, TaskStatus::Pending);
    }

    #[test]
    fn test_create_requires_title() {
        for body in [r#"{}"#, r#"{"title": ""}"#, r#"{"title": "   "}"#] {
            let err = create_req(body).into_create(Uuid::new_v4()).unwrap_err();
            assert_eq!(err.client_message(), TITLE_REQUIRED);
        }
    }

    #[test]
    fn test_create_rejects_unknown_status() {
        let err = create_req(r#"{"title": "x", "status": "done"}"#)
            .into_create(Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(err.client_message().contains("done"));
    }

    #[test]
    fn test_create_accepts_explicit_fields() {
        let data = create_req(r#"{"title": " Ship ", "description": "v2", "status": "in_progress"}"#)
            .into_create(Uuid::new_v4())
            .unwrap();
        assert_eq!(data.title, "Ship");
        assert_eq!(data.description, "v2");
        assert_eq!(data.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_title_length_limit() {
        let owner = Uuid::new_v4();
        let at_limit = json!({ "title": "é".repeat(255) }).to_string();
        assert!(create_req(&at_limit).into_create(owner).is_ok());

        let over = json!({ "title": "a".repeat(256) }).to_string();
        let err = create_req(&over).into_create(owner).unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.client_message(), "Title must be at most 255 characters");

        let err = update_req(&over).into_update().unwrap_err();
        assert_eq!(err.client_message(), "Title must be at most 255 characters");
    }

    #[test]
    fn test_nul_rejected_in_text_fields() {
        for body in [
            json!({ "title": "a\0b" }),
            json!({ "title": "ok", "description": "x\0" }),
        ] {
            let err = create_req(&body.to_string())
                .into_create(Uuid::new_v4())
                .unwrap_err();
            assert_eq!(err.client_message(), NUL_IN_TEXT);
        }

        let err = update_req(r#"{"description": "\u0000"}"#).into_update().unwrap_err();
        assert_eq!(err.client_message(), NUL_IN_TEXT);
    }

    #[test]
    fn test_update_keeps_absent_fields() {
        let data = update_req(r#"{"status": "completed"}"#).into_update().unwrap();
        assert!(data.title.is_none());
        assert!(data.description.is_none());
        assert_eq!(data.status, Some(TaskStatus::Completed));
    }

    #[test]
    fn test_update_rejects_blank_title() {
        let err = update_req(r#"{"title": " "}"#).into_update().unwrap_err();
        assert_eq!(err.client_message(), TITLE_REQUIRED);
    }

    #[test]
    fn test_non_uuid_id_is_not_found() {
        let err = parse_task_id("42").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.client_message(), TASK_NOT_FOUND);
    }

    #[test]
    fn test_created_response_uses_camel_case() {
        let id = Uuid::new_v4();
        let body = serde_json::to_value(TaskCreatedResponse {
            message: "Task created".to_string(),
            task_id: id,
        })
        .unwrap();
        assert_eq!(body["taskId"], id.to_string());
    }
}
