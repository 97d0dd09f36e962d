//! Lead routes
//!
//! CRUD, pipeline moves, assignment, conversion into customers and the
//! activity log.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::common::{self, like_pattern};
use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::activities::{
    Activity, ActivityListQuery, CreateActivityRequest, ACTIVITY_SELECT,
};
use crate::domain::customers::{Customer, CUSTOMER_COLUMNS};
use crate::domain::leads::{
    group_by_stage, AssignLeadRequest, CreateLeadRequest, Lead, LeadDetail, LeadListQuery,
    LeadStatus, PipelineResponse, PipelineStats, UpdateLeadRequest, UpdateLeadStatusRequest,
    LEAD_SELECT,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};
use crate::services::cache::invalidate_dashboard;

const LEAD_FILTER: &str = r#"
    WHERE l.company_id = $1
      AND ($2::text IS NULL OR l.status = $2)
      AND ($3::text IS NULL OR l.source = $3)
      AND ($4::bigint IS NULL OR l.assigned_to_id = $4)
      AND ($5::text IS NULL OR l.first_name ILIKE $5 OR l.last_name ILIKE $5
           OR l.email ILIKE $5 OR l.company_name ILIKE $5)
"#;

pub(crate) async fn load_lead(state: &AppState, company_id: i64, lead_id: i64) -> ApiResult<Lead> {
    sqlx::query_as::<_, Lead>(&format!(
        "{} WHERE l.id = $1 AND l.company_id = $2",
        LEAD_SELECT
    ))
    .bind(lead_id)
    .bind(company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Lead not found"))
}

async fn invalidate(state: &AppState, company_id: i64) {
    invalidate_dashboard(state.cache.as_ref(), company_id).await;
}

/// GET /api/v1/leads
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<LeadListQuery>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let status = common::filter_value(filters.status.as_deref());
    let source = common::filter_value(filters.source.as_deref());
    let search = like_pattern(filters.search.as_deref());

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM leads l {}", LEAD_FILTER))
        .bind(auth.company_id)
        .bind(status)
        .bind(source)
        .bind(filters.assigned_to)
        .bind(&search)
        .fetch_one(&state.db)
        .await?;

    let leads = sqlx::query_as::<_, Lead>(&format!(
        "{} {} ORDER BY l.created_at DESC LIMIT $6 OFFSET $7",
        LEAD_SELECT, LEAD_FILTER
    ))
    .bind(auth.company_id)
    .bind(status)
    .bind(source)
    .bind(filters.assigned_to)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(leads, &pagination, total))
}

/// POST /api/v1/leads
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<CreateLeadRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    if let Some(assignee) = req.assigned_to_id {
        common::ensure_company_user(&state.db, auth.company_id, assignee).await?;
    }

    let lead_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO leads
            (company_id, assigned_to_id, first_name, last_name, email, phone, company_name,
             job_title, industry, source, status, estimated_value, notes, next_follow_up)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id
        "#,
    )
    .bind(auth.company_id)
    .bind(req.assigned_to_id)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(req.email.trim())
    .bind(&req.phone)
    .bind(&req.company_name)
    .bind(&req.job_title)
    .bind(&req.industry)
    .bind(req.source.map(|s| s.as_str()))
    .bind(req.status.as_str())
    .bind(req.estimated_value)
    .bind(&req.notes)
    .bind(req.next_follow_up)
    .fetch_one(&state.db)
    .await?;

    let lead = load_lead(&state, auth.company_id, lead_id).await?;

    tracing::info!(company_id = auth.company_id, lead_id, "Lead created");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "lead_created",
            format!("Created lead {} {}", lead.first_name, lead.last_name),
        )
        .resource("lead", lead_id),
        &meta,
    )
    .await;
    invalidate(&state, auth.company_id).await;

    Ok(Created(lead))
}

/// GET /api/v1/leads/:id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let lead = load_lead(&state, auth.company_id, lead_id).await?;

    let activities = sqlx::query_as::<_, Activity>(&format!(
        "{} WHERE a.lead_id = $1 AND a.company_id = $2 ORDER BY a.created_at DESC",
        ACTIVITY_SELECT
    ))
    .bind(lead_id)
    .bind(auth.company_id)
    .fetch_all(&state.db)
    .await?;

    let converted_customer_id: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM customers WHERE lead_id = $1 AND company_id = $2 LIMIT 1",
    )
    .bind(lead_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?;

    Ok(DataResponse::new(LeadDetail {
        lead,
        activities,
        converted_customer_id,
    }))
}

/// PUT /api/v1/leads/:id
pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<UpdateLeadRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    if let Some(assignee) = req.assigned_to_id {
        common::ensure_company_user(&state.db, auth.company_id, assignee).await?;
    }

    let updated = sqlx::query(
        r#"
        UPDATE leads SET
            first_name = COALESCE($1, first_name),
            last_name = COALESCE($2, last_name),
            email = COALESCE($3, email),
            phone = COALESCE($4, phone),
            company_name = COALESCE($5, company_name),
            job_title = COALESCE($6, job_title),
            industry = COALESCE($7, industry),
            source = COALESCE($8, source),
            status = COALESCE($9, status),
            estimated_value = COALESCE($10, estimated_value),
            notes = COALESCE($11, notes),
            next_follow_up = COALESCE($12, next_follow_up),
            assigned_to_id = COALESCE($13, assigned_to_id),
            updated_at = NOW()
        WHERE id = $14 AND company_id = $15
        "#,
    )
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(req.email.as_deref().map(str::trim))
    .bind(&req.phone)
    .bind(&req.company_name)
    .bind(&req.job_title)
    .bind(&req.industry)
    .bind(req.source.map(|s| s.as_str()))
    .bind(req.status.map(|s| s.as_str()))
    .bind(req.estimated_value)
    .bind(&req.notes)
    .bind(req.next_follow_up)
    .bind(req.assigned_to_id)
    .bind(lead_id)
    .bind(auth.company_id)
    .execute(&state.db)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Lead not found"));
    }

    let lead = load_lead(&state, auth.company_id, lead_id).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "lead_updated",
            format!("Updated lead {} {}", lead.first_name, lead.last_name),
        )
        .resource("lead", lead_id),
        &meta,
    )
    .await;
    invalidate(&state, auth.company_id).await;

    Ok(DataResponse::new(lead))
}

/// DELETE /api/v1/leads/:id
pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let deleted = sqlx::query("DELETE FROM leads WHERE id = $1 AND company_id = $2")
        .bind(lead_id)
        .bind(auth.company_id)
        .execute(&state.db)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Lead not found"));
    }

    tracing::info!(company_id = auth.company_id, lead_id, "Lead deleted");

    audit::record(
        &state.db,
        AuditEntry::new(auth.company_id, Some(auth.user_id), "lead_deleted", "Deleted lead")
            .resource("lead", lead_id),
        &meta,
    )
    .await;
    invalidate(&state, auth.company_id).await;

    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/v1/leads/:id/status
pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<UpdateLeadStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let status = LeadStatus::parse(req.status.trim())
        .ok_or_else(|| ApiError::bad_request(format!("Invalid status: {}", req.status)))?;

    let updated = sqlx::query(
        "UPDATE leads SET status = $1, updated_at = NOW() WHERE id = $2 AND company_id = $3",
    )
    .bind(status.as_str())
    .bind(lead_id)
    .bind(auth.company_id)
    .execute(&state.db)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Lead not found"));
    }

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "lead_status_updated",
            format!("Lead status changed to {}", status.as_str()),
        )
        .resource("lead", lead_id),
        &meta,
    )
    .await;
    invalidate(&state, auth.company_id).await;

    Ok(DataResponse::new(load_lead(&state, auth.company_id, lead_id).await?))
}

/// POST /api/v1/leads/:id/assign
pub async fn assign_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<AssignLeadRequest>,
) -> ApiResult<impl IntoResponse> {
    common::ensure_company_user(&state.db, auth.company_id, req.user_id).await?;

    let updated = sqlx::query(
        "UPDATE leads SET assigned_to_id = $1, updated_at = NOW() \
         WHERE id = $2 AND company_id = $3",
    )
    .bind(req.user_id)
    .bind(lead_id)
    .bind(auth.company_id)
    .execute(&state.db)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Lead not found"));
    }

    let lead = load_lead(&state, auth.company_id, lead_id).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "lead_assigned",
            format!(
                "Lead assigned to {}",
                lead.assigned_to_name.as_deref().unwrap_or("user")
            ),
        )
        .resource("lead", lead_id),
        &meta,
    )
    .await;
    invalidate(&state, auth.company_id).await;

    Ok(DataResponse::new(lead))
}

/// POST /api/v1/leads/:id/convert
///
/// Creates a customer from the lead and marks the lead as won.
pub async fn convert_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let mut tx = state.db.begin().await?;

    #[derive(sqlx::FromRow)]
    struct LeadContact {
        first_name: String,
        last_name: String,
        email: String,
        phone: Option<String>,
        company_name: Option<String>,
    }

    let lead = sqlx::query_as::<_, LeadContact>(
        r#"
        SELECT first_name, last_name, email, phone, company_name
        FROM leads WHERE id = $1 AND company_id = $2
        FOR UPDATE
        "#,
    )
    .bind(lead_id)
    .bind(auth.company_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Lead not found"))?;

    let already: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM customers WHERE lead_id = $1 AND company_id = $2)",
    )
    .bind(lead_id)
    .bind(auth.company_id)
    .fetch_one(&mut *tx)
    .await?;
    if already {
        return Err(ApiError::conflict("Lead has already been converted"));
    }

    let customer = sqlx::query_as::<_, Customer>(&format!(
        r#"
        INSERT INTO customers (company_id, lead_id, first_name, last_name, email, phone,
            company_name)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        CUSTOMER_COLUMNS
    ))
    .bind(auth.company_id)
    .bind(lead_id)
    .bind(&lead.first_name)
    .bind(&lead.last_name)
    .bind(&lead.email)
    .bind(&lead.phone)
    .bind(&lead.company_name)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE leads SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(LeadStatus::ClosedWon.as_str())
        .bind(lead_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        company_id = auth.company_id,
        lead_id,
        customer_id = customer.id,
        "Lead converted"
    );

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "lead_converted",
            format!("Converted lead {} {} to customer", lead.first_name, lead.last_name),
        )
        .resource("customer", customer.id),
        &meta,
    )
    .await;
    invalidate(&state, auth.company_id).await;

    Ok(Created(customer))
}

/// GET /api/v1/leads/:id/activities
pub async fn list_lead_activities(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    load_lead(&state, auth.company_id, lead_id).await?;

    let activities = sqlx::query_as::<_, Activity>(&format!(
        "{} WHERE a.lead_id = $1 AND a.company_id = $2 ORDER BY a.created_at DESC",
        ACTIVITY_SELECT
    ))
    .bind(lead_id)
    .bind(auth.company_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(activities))
}

/// POST /api/v1/leads/:id/activities
pub async fn add_lead_activity(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<CreateActivityRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    load_lead(&state, auth.company_id, lead_id).await?;

    let activity_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO activities
            (company_id, user_id, lead_id, activity_type, subject, description, scheduled_at,
             completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(auth.company_id)
    .bind(auth.user_id)
    .bind(lead_id)
    .bind(req.activity_type.as_str())
    .bind(&req.subject)
    .bind(&req.description)
    .bind(req.scheduled_at)
    .bind(req.completed_at)
    .fetch_one(&state.db)
    .await?;

    let activity = sqlx::query_as::<_, Activity>(&format!("{} WHERE a.id = $1", ACTIVITY_SELECT))
        .bind(activity_id)
        .fetch_one(&state.db)
        .await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "activity_added",
            format!("Logged {} on lead", req.activity_type.as_str()),
        )
        .resource("lead", lead_id),
        &meta,
    )
    .await;
    invalidate(&state, auth.company_id).await;

    Ok(Created(activity))
}

/// GET /api/v1/activities
pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<ActivityListQuery>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    const FILTER: &str = r#"
        WHERE a.company_id = $1
          AND ($2::bigint IS NULL OR a.lead_id = $2)
          AND ($3::bigint IS NULL OR a.customer_id = $3)
          AND ($4::text IS NULL OR a.activity_type = $4)
    "#;
    let activity_type = common::filter_value(filters.activity_type.as_deref());

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM activities a {}", FILTER))
        .bind(auth.company_id)
        .bind(filters.lead_id)
        .bind(filters.customer_id)
        .bind(activity_type)
        .fetch_one(&state.db)
        .await?;

    let activities = sqlx::query_as::<_, Activity>(&format!(
        "{} {} ORDER BY a.created_at DESC LIMIT $5 OFFSET $6",
        ACTIVITY_SELECT, FILTER
    ))
    .bind(auth.company_id)
    .bind(filters.lead_id)
    .bind(filters.customer_id)
    .bind(activity_type)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(activities, &pagination, total))
}

/// GET /api/v1/pipeline
pub async fn pipeline(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let leads = sqlx::query_as::<_, Lead>(&format!(
        "{} WHERE l.company_id = $1 ORDER BY l.created_at ASC",
        LEAD_SELECT
    ))
    .bind(auth.company_id)
    .fetch_all(&state.db)
    .await?;

    let counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM leads WHERE company_id = $1 GROUP BY status",
    )
    .bind(auth.company_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(PipelineResponse {
        stages: group_by_stage(leads),
        stats: PipelineStats::from_counts(&counts),
    }))
}
