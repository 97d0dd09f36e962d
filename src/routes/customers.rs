//! Customer routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::common::like_pattern;
use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::customers::{
    validate_credit_limit, CreateCustomerRequest, Customer, CustomerDetail, SearchQuery,
    UpdateCustomerRequest, CUSTOMER_COLUMNS,
};
use crate::domain::invoices::InvoiceSummary;
use crate::domain::quotations::QuotationSummary;
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};
use crate::services::cache::invalidate_dashboard;

const CUSTOMER_FILTER: &str = r#"
    WHERE company_id = $1
      AND ($2::text IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2
           OR email ILIKE $2 OR company_name ILIKE $2)
"#;

async fn load_customer(state: &AppState, company_id: i64, customer_id: i64) -> ApiResult<Customer> {
    sqlx::query_as::<_, Customer>(&format!(
        "SELECT {} FROM customers WHERE id = $1 AND company_id = $2",
        CUSTOMER_COLUMNS
    ))
    .bind(customer_id)
    .bind(company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Customer not found"))
}

/// GET /api/v1/customers
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<SearchQuery>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let search = like_pattern(query.search.as_deref());

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM customers {}", CUSTOMER_FILTER))
            .bind(auth.company_id)
            .bind(&search)
            .fetch_one(&state.db)
            .await?;

    let customers = sqlx::query_as::<_, Customer>(&format!(
        "SELECT {} FROM customers {} ORDER BY created_at DESC LIMIT $3 OFFSET $4",
        CUSTOMER_COLUMNS, CUSTOMER_FILTER
    ))
    .bind(auth.company_id)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(customers, &pagination, total))
}

/// POST /api/v1/customers
pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<CreateCustomerRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    validate_credit_limit(req.credit_limit).map_err(ApiError::BadRequest)?;

    let customer = sqlx::query_as::<_, Customer>(&format!(
        r#"
        INSERT INTO customers
            (company_id, first_name, last_name, email, phone, company_name, address, tax_id,
             credit_limit, payment_terms)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        CUSTOMER_COLUMNS
    ))
    .bind(auth.company_id)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(req.email.trim())
    .bind(&req.phone)
    .bind(&req.company_name)
    .bind(&req.address)
    .bind(&req.tax_id)
    .bind(req.credit_limit)
    .bind(&req.payment_terms)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(company_id = auth.company_id, customer_id = customer.id, "Customer created");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "customer_created",
            format!("Created customer {} {}", customer.first_name, customer.last_name),
        )
        .resource("customer", customer.id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(Created(customer))
}

/// GET /api/v1/customers/:id
pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<i64>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let customer = load_customer(&state, auth.company_id, customer_id).await?;

    let quotations = sqlx::query_as::<_, QuotationSummary>(
        r#"
        SELECT id, quotation_number, subject, total_amount, status, created_at
        FROM quotations WHERE customer_id = $1 AND company_id = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(customer_id)
    .bind(auth.company_id)
    .fetch_all(&state.db)
    .await?;

    let invoices = sqlx::query_as::<_, InvoiceSummary>(
        r#"
        SELECT id, invoice_number, subject, total_amount, status, due_date, created_at
        FROM invoices WHERE customer_id = $1 AND company_id = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(customer_id)
    .bind(auth.company_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(CustomerDetail {
        customer,
        quotations,
        invoices,
    }))
}

/// PUT /api/v1/customers/:id
pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<UpdateCustomerRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    validate_credit_limit(req.credit_limit).map_err(ApiError::BadRequest)?;

    let customer = sqlx::query_as::<_, Customer>(&format!(
        r#"
        UPDATE customers SET
            first_name = COALESCE($1, first_name),
            last_name = COALESCE($2, last_name),
            email = COALESCE($3, email),
            phone = COALESCE($4, phone),
            company_name = COALESCE($5, company_name),
            address = COALESCE($6, address),
            tax_id = COALESCE($7, tax_id),
            credit_limit = COALESCE($8, credit_limit),
            payment_terms = COALESCE($9, payment_terms),
            updated_at = NOW()
        WHERE id = $10 AND company_id = $11
        RETURNING {}
        "#,
        CUSTOMER_COLUMNS
    ))
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(req.email.as_deref().map(str::trim))
    .bind(&req.phone)
    .bind(&req.company_name)
    .bind(&req.address)
    .bind(&req.tax_id)
    .bind(req.credit_limit)
    .bind(&req.payment_terms)
    .bind(customer_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "customer_updated",
            format!("Updated customer {} {}", customer.first_name, customer.last_name),
        )
        .resource("customer", customer.id),
        &meta,
    )
    .await;

    Ok(DataResponse::new(customer))
}

/// DELETE /api/v1/customers/:id
///
/// Refused while quotations or invoices still reference the customer.
pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let deleted = sqlx::query("DELETE FROM customers WHERE id = $1 AND company_id = $2")
        .bind(customer_id)
        .bind(auth.company_id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            ApiError::in_use_or_db(e, "Customer has quotations or invoices and cannot be deleted")
        })?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Customer not found"));
    }

    audit::record(
        &state.db,
        AuditEntry::new(auth.company_id, Some(auth.user_id), "customer_deleted", "Deleted customer")
            .resource("customer", customer_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(StatusCode::NO_CONTENT)
}
