//! Audit trail writer.

use sqlx::PgPool;

use crate::middleware::RequestMeta;

/// One row for `audit_logs`.
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub company_id: i64,
    pub user_id: Option<i64>,
    pub action: &'a str,
    pub message: String,
    pub resource_type: Option<&'a str>,
    pub resource_id: Option<i64>,
}

impl<'a> AuditEntry<'a> {
    pub fn new(
        company_id: i64,
        user_id: Option<i64>,
        action: &'a str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            company_id,
            user_id,
            action,
            message: message.into(),
            resource_type: None,
            resource_id: None,
        }
    }

    pub fn resource(mut self, resource_type: &'a str, resource_id: i64) -> Self {
        self.resource_type = Some(resource_type);
        self.resource_id = Some(resource_id);
        self
    }
}

/// Stores the entry. A failed insert is logged and swallowed.
pub async fn record(db: &PgPool, entry: AuditEntry<'_>, meta: &RequestMeta) {
    let details = serde_json::json!({ "message": entry.message });

    let result = sqlx::query(
        r#"
        INSERT INTO audit_logs
            (company_id, user_id, action, resource_type, resource_id, details, ip_address,
             user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.company_id)
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.resource_type)
    .bind(entry.resource_id)
    .bind(&details)
    .bind(meta.ip_address.as_deref())
    .bind(meta.user_agent.as_deref())
    .execute(db)
    .await;

    match result {
        Ok(_) => tracing::debug!(
            company_id = entry.company_id,
            action = entry.action,
            resource_id = entry.resource_id,
            "Audit entry recorded"
        ),
        Err(e) => tracing::error!(
            company_id = entry.company_id,
            action = entry.action,
            error = %e,
            "Failed to record audit entry"
        ),
    }
}
