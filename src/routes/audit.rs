use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use std::sync::Arc;

use super::common::filter_value;
use crate::api::{Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireManager;
use crate::domain::audit::{AuditLog, AuditLogQuery, AUDIT_SELECT};
use crate::error::ApiResult;

const AUDIT_FILTER: &str = r#"
    WHERE al.company_id = $1
      AND ($2::text IS NULL OR al.action = $2)
      AND ($3::text IS NULL OR al.resource_type = $3)
      AND ($4::bigint IS NULL OR al.user_id = $4)
"#;

/// GET /api/v1/audit-logs
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<AuditLogQuery>,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    let action = filter_value(filters.action.as_deref());
    let resource_type = filter_value(filters.resource_type.as_deref());

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM audit_logs al {}", AUDIT_FILTER))
            .bind(auth.company_id)
            .bind(action)
            .bind(resource_type)
            .bind(filters.user_id)
            .fetch_one(&state.db)
            .await?;

    let logs = sqlx::query_as::<_, AuditLog>(&format!(
        "{} {} ORDER BY al.created_at DESC, al.id DESC LIMIT $5 OFFSET $6",
        AUDIT_SELECT, AUDIT_FILTER
    ))
    .bind(auth.company_id)
    .bind(action)
    .bind(resource_type)
    .bind(filters.user_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(logs, &pagination, total))
}
