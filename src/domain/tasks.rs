//! Task domain types
//!
//! Follow-up work items assigned to team members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Task status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Task priority enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub company_id: i64,
    pub assigned_to_id: Option<i64>,
    pub assigned_to_name: Option<String>, // Display name
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expects `tasks t LEFT JOIN users u ON u.id = t.assigned_to_id`.
pub const TASK_SELECT: &str = r#"
    SELECT t.id, t.company_id, t.assigned_to_id,
           CASE WHEN u.id IS NULL THEN NULL
                ELSE u.first_name || ' ' || u.last_name END AS assigned_to_name,
           t.title, t.description, t.priority, t.status, t.due_date, t.completed_at,
           t.created_at, t.updated_at
    FROM tasks t
    LEFT JOIN users u ON u.id = t.assigned_to_id
"#;

/// Request DTO for creating a task
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "is required"))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub assigned_to_id: Option<i64>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

/// Request DTO for updating a task
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_to_id: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<i64>,
    #[serde(default)]
    pub mine: bool,
}

/// How `completed_at` changes when a task moves to `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStamp {
    Set,
    Clear,
    Keep,
}

pub fn completion_stamp(next: Option<TaskStatus>) -> CompletionStamp {
    match next {
        Some(TaskStatus::Completed) => CompletionStamp::Set,
        Some(_) => CompletionStamp::Clear,
        None => CompletionStamp::Keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_new_task() {
        let req: CreateTaskRequest =
            serde_json::from_value(serde_json::json!({ "title": "Call back" })).unwrap();
        assert_eq!(req.status, TaskStatus::Pending);
        assert_eq!(req.priority, TaskPriority::Medium);
    }

    #[test]
    fn completion_stamp_follows_status() {
        assert_eq!(completion_stamp(Some(TaskStatus::Completed)), CompletionStamp::Set);
        assert_eq!(completion_stamp(Some(TaskStatus::InProgress)), CompletionStamp::Clear);
        assert_eq!(completion_stamp(None), CompletionStamp::Keep);
    }
}
