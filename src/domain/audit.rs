//! Audit log types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub company_id: i64,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub details: Option<sqlx::types::Json<serde_json::Value>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Expects `audit_logs al LEFT JOIN users u ON u.id = al.user_id`.
pub const AUDIT_SELECT: &str = r#"
    SELECT al.id, al.company_id, al.user_id,
           CASE WHEN u.id IS NULL THEN NULL
                ELSE u.first_name || ' ' || u.last_name END AS user_name,
           al.action, al.resource_type, al.resource_id, al.details, al.ip_address,
           al.user_agent, al.created_at
    FROM audit_logs al
    LEFT JOIN users u ON u.id = al.user_id
"#;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub user_id: Option<i64>,
}
