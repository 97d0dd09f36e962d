//! Task routes
//!
//! Follow-up work assigned to team members.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::common::{ensure_company_user, filter_value};
use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::tasks::{
    completion_stamp, CompletionStamp, CreateTaskRequest, Task, TaskListQuery, TaskStatus,
    UpdateTaskRequest, TASK_SELECT,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};
use crate::services::cache::invalidate_dashboard;

const TASK_FILTER: &str = r#"
    WHERE t.company_id = $1
      AND ($2::text IS NULL OR t.status = $2)
      AND ($3::text IS NULL OR t.priority = $3)
      AND ($4::bigint IS NULL OR t.assigned_to_id = $4)
"#;

fn stamp_sql(stamp: CompletionStamp) -> &'static str {
    match stamp {
        CompletionStamp::Set => "COALESCE(completed_at, NOW())",
        CompletionStamp::Clear => "NULL",
        CompletionStamp::Keep => "completed_at",
    }
}

async fn load_task(state: &AppState, company_id: i64, task_id: i64) -> ApiResult<Task> {
    sqlx::query_as::<_, Task>(&format!(
        "{} WHERE t.id = $1 AND t.company_id = $2",
        TASK_SELECT
    ))
    .bind(task_id)
    .bind(company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Task not found"))
}

/// GET /api/v1/tasks
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<TaskListQuery>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let status = filter_value(filters.status.as_deref());
    let priority = filter_value(filters.priority.as_deref());
    let assignee = if filters.mine {
        Some(auth.user_id)
    } else {
        filters.assigned_to
    };

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM tasks t {}", TASK_FILTER))
        .bind(auth.company_id)
        .bind(status)
        .bind(priority)
        .bind(assignee)
        .fetch_one(&state.db)
        .await?;

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "{} {} ORDER BY t.due_date ASC NULLS LAST, t.created_at DESC LIMIT $5 OFFSET $6",
        TASK_SELECT, TASK_FILTER
    ))
    .bind(auth.company_id)
    .bind(status)
    .bind(priority)
    .bind(assignee)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(tasks, &pagination, total))
}

/// POST /api/v1/tasks
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    if let Some(assignee) = req.assigned_to_id {
        ensure_company_user(&state.db, auth.company_id, assignee).await?;
    }

    let completed = req.status == TaskStatus::Completed;
    let task_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO tasks
            (company_id, assigned_to_id, title, description, priority, status, due_date,
             completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $8 THEN NOW() ELSE NULL END)
        RETURNING id
        "#,
    )
    .bind(auth.company_id)
    .bind(req.assigned_to_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.priority.as_str())
    .bind(req.status.as_str())
    .bind(req.due_date)
    .bind(completed)
    .fetch_one(&state.db)
    .await?;

    let task = load_task(&state, auth.company_id, task_id).await?;
    tracing::info!(company_id = auth.company_id, task_id, "Task created");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "task_created",
            format!("Created task {}", task.title),
        )
        .resource("task", task_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(Created(task))
}

/// GET /api/v1/tasks/:id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    Ok(DataResponse::new(load_task(&state, auth.company_id, task_id).await?))
}

/// PUT /api/v1/tasks/:id
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    if let Some(assignee) = req.assigned_to_id {
        ensure_company_user(&state.db, auth.company_id, assignee).await?;
    }

    let updated = sqlx::query(&format!(
        r#"
        UPDATE tasks SET
            title = COALESCE($1, title),
            description = COALESCE($2, description),
            status = COALESCE($3, status),
            priority = COALESCE($4, priority),
            assigned_to_id = COALESCE($5, assigned_to_id),
            due_date = COALESCE($6, due_date),
            completed_at = {},
            updated_at = NOW()
        WHERE id = $7 AND company_id = $8
        "#,
        stamp_sql(completion_stamp(req.status))
    ))
    .bind(req.title.as_deref().map(str::trim))
    .bind(&req.description)
    .bind(req.status.map(|s| s.as_str()))
    .bind(req.priority.map(|p| p.as_str()))
    .bind(req.assigned_to_id)
    .bind(req.due_date)
    .bind(task_id)
    .bind(auth.company_id)
    .execute(&state.db)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Task not found"));
    }

    let task = load_task(&state, auth.company_id, task_id).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "task_updated",
            format!("Updated task {}", task.title),
        )
        .resource("task", task_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(DataResponse::new(task))
}

/// DELETE /api/v1/tasks/:id
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let title: String =
        sqlx::query_scalar("DELETE FROM tasks WHERE id = $1 AND company_id = $2 RETURNING title")
            .bind(task_id)
            .bind(auth.company_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Task not found"))?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "task_deleted",
            format!("Deleted task {}", title),
        )
        .resource("task", task_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/tasks/:id/complete
pub async fn complete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let updated = sqlx::query(&format!(
        r#"
        UPDATE tasks SET status = $1, completed_at = {}, updated_at = NOW()
        WHERE id = $2 AND company_id = $3
        "#,
        stamp_sql(CompletionStamp::Set)
    ))
    .bind(TaskStatus::Completed.as_str())
    .bind(task_id)
    .bind(auth.company_id)
    .execute(&state.db)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Task not found"));
    }

    let task = load_task(&state, auth.company_id, task_id).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "task_completed",
            format!("Completed task {}", task.title),
        )
        .resource("task", task_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(DataResponse::new(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_keeps_an_existing_stamp() {
        assert_eq!(stamp_sql(CompletionStamp::Set), "COALESCE(completed_at, NOW())");
        assert_eq!(stamp_sql(CompletionStamp::Clear), "NULL");
        assert_eq!(stamp_sql(CompletionStamp::Keep), "completed_at");
    }
}
