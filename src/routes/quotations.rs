//! Quotation routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::common::{ensure_company_customer, filter_value, like_pattern};
use super::line_items::{self as items, DocumentKind};
use crate::api::{Created, DataResponse, MessageResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::invoices::{Invoice, InvoiceStatus, INVOICE_SELECT};
use crate::domain::numbering;
use crate::domain::quotations::{
    duplicate_subject, CreateQuotationRequest, DocumentListQuery, Quotation, QuotationDetail,
    QuotationStatus, SendDocumentRequest, UpdateQuotationRequest, QUOTATION_SELECT,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};
use crate::services::cache::invalidate_dashboard;

const QUOTATION_FILTER: &str = r#"
    WHERE q.company_id = $1
      AND ($2::text IS NULL OR q.status = $2)
      AND ($3::bigint IS NULL OR q.customer_id = $3)
      AND ($4::text IS NULL OR q.quotation_number ILIKE $4 OR q.subject ILIKE $4)
"#;

async fn load_quotation(
    state: &AppState,
    company_id: i64,
    quotation_id: i64,
) -> ApiResult<Quotation> {
    sqlx::query_as::<_, Quotation>(&format!(
        "{} WHERE q.id = $1 AND q.company_id = $2",
        QUOTATION_SELECT
    ))
    .bind(quotation_id)
    .bind(company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Quotation not found"))
}

async fn detail(state: &AppState, quotation: Quotation) -> ApiResult<QuotationDetail> {
    let items = items::load_items(&state.db, DocumentKind::Quotation, quotation.id).await?;
    Ok(QuotationDetail { quotation, items })
}

/// GET /api/v1/quotations
pub async fn list_quotations(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<DocumentListQuery>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let status = filter_value(filters.status.as_deref());
    let search = like_pattern(filters.search.as_deref());

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM quotations q {}",
        QUOTATION_FILTER
    ))
    .bind(auth.company_id)
    .bind(status)
    .bind(filters.customer_id)
    .bind(&search)
    .fetch_one(&state.db)
    .await?;

    let quotations = sqlx::query_as::<_, Quotation>(&format!(
        "{} {} ORDER BY q.created_at DESC LIMIT $5 OFFSET $6",
        QUOTATION_SELECT, QUOTATION_FILTER
    ))
    .bind(auth.company_id)
    .bind(status)
    .bind(filters.customer_id)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(quotations, &pagination, total))
}

/// POST /api/v1/quotations
pub async fn create_quotation(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<CreateQuotationRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let mut tx = state.db.begin().await?;
    ensure_company_customer(&mut *tx, auth.company_id, req.customer_id).await?;
    let (lines, totals) = items::price_items(&mut tx, auth.company_id, &req.items).await?;

    let quotation_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quotations
            (company_id, customer_id, quotation_number, subject, valid_until, subtotal,
             tax_amount, total_amount, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(auth.company_id)
    .bind(req.customer_id)
    .bind(numbering::quotation_number())
    .bind(&req.subject)
    .bind(req.valid_until)
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.total_amount)
    .bind(req.status.as_str())
    .bind(&req.notes)
    .fetch_one(&mut *tx)
    .await?;

    items::insert_items(&mut tx, DocumentKind::Quotation, quotation_id, &lines).await?;
    tx.commit().await?;

    let quotation = load_quotation(&state, auth.company_id, quotation_id).await?;
    tracing::info!(
        company_id = auth.company_id,
        quotation_id,
        number = %quotation.quotation_number,
        "Quotation created"
    );

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "quotation_created",
            format!("Created quotation {}", quotation.quotation_number),
        )
        .resource("quotation", quotation_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(Created(detail(&state, quotation).await?))
}

/// GET /api/v1/quotations/:id
pub async fn get_quotation(
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<i64>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let quotation = load_quotation(&state, auth.company_id, quotation_id).await?;
    Ok(DataResponse::new(detail(&state, quotation).await?))
}

/// PUT /api/v1/quotations/:id
pub async fn update_quotation(
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<UpdateQuotationRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let mut tx = state.db.begin().await?;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM quotations WHERE id = $1 AND company_id = $2)",
    )
    .bind(quotation_id)
    .bind(auth.company_id)
    .fetch_one(&mut *tx)
    .await?;
    if !exists {
        return Err(ApiError::not_found("Quotation not found"));
    }

    if let Some(customer_id) = req.customer_id {
        ensure_company_customer(&mut *tx, auth.company_id, customer_id).await?;
    }

    let totals = match &req.items {
        Some(requested) => {
            let (lines, totals) = items::price_items(&mut tx, auth.company_id, requested).await?;
            items::delete_items(&mut tx, DocumentKind::Quotation, quotation_id).await?;
            items::insert_items(&mut tx, DocumentKind::Quotation, quotation_id, &lines).await?;
            Some(totals)
        }
        None => None,
    };

    sqlx::query(
        r#"
        UPDATE quotations SET
            customer_id = COALESCE($1, customer_id),
            subject = COALESCE($2, subject),
            valid_until = COALESCE($3, valid_until),
            status = COALESCE($4, status),
            notes = COALESCE($5, notes),
            subtotal = COALESCE($6, subtotal),
            tax_amount = COALESCE($7, tax_amount),
            total_amount = COALESCE($8, total_amount),
            updated_at = NOW()
        WHERE id = $9 AND company_id = $10
        "#,
    )
    .bind(req.customer_id)
    .bind(&req.subject)
    .bind(req.valid_until)
    .bind(req.status.map(|s| s.as_str()))
    .bind(&req.notes)
    .bind(totals.map(|t| t.subtotal))
    .bind(totals.map(|t| t.tax_amount))
    .bind(totals.map(|t| t.total_amount))
    .bind(quotation_id)
    .bind(auth.company_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let quotation = load_quotation(&state, auth.company_id, quotation_id).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "quotation_updated",
            format!("Updated quotation {}", quotation.quotation_number),
        )
        .resource("quotation", quotation_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(DataResponse::new(detail(&state, quotation).await?))
}

/// DELETE /api/v1/quotations/:id
pub async fn delete_quotation(
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let number: String = sqlx::query_scalar(
        "DELETE FROM quotations WHERE id = $1 AND company_id = $2 RETURNING quotation_number",
    )
    .bind(quotation_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Quotation not found"))?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "quotation_deleted",
            format!("Deleted quotation {}", number),
        )
        .resource("quotation", quotation_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/quotations/:id/send
///
/// The email is best effort; the status moves to sent either way.
pub async fn send_quotation(
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<SendDocumentRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let quotation = load_quotation(&state, auth.company_id, quotation_id).await?;

    let subject = req
        .subject
        .clone()
        .unwrap_or_else(|| format!("Quotation {}", quotation.quotation_number));
    let body = items::summary_email(
        "Quotation",
        &quotation.quotation_number,
        quotation.subject.as_deref(),
        quotation.total_amount,
        req.message.as_deref(),
    );
    let delivered = state
        .mailer
        .send_best_effort(req.recipient_email.trim(), &subject, body)
        .await;

    sqlx::query(
        "UPDATE quotations SET status = $1, updated_at = NOW() WHERE id = $2 AND company_id = $3",
    )
    .bind(QuotationStatus::Sent.as_str())
    .bind(quotation_id)
    .bind(auth.company_id)
    .execute(&state.db)
    .await?;

    tracing::info!(quotation_id, delivered, "Quotation sent");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "quotation_sent",
            format!(
                "Sent quotation {} to {}",
                quotation.quotation_number,
                req.recipient_email.trim()
            ),
        )
        .resource("quotation", quotation_id),
        &meta,
    )
    .await;

    Ok(MessageResponse::new("Quotation sent successfully"))
}

/// POST /api/v1/quotations/:id/convert
pub async fn convert_quotation(
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let mut tx = state.db.begin().await?;

    #[derive(sqlx::FromRow)]
    struct Source {
        customer_id: i64,
        quotation_number: String,
        subject: Option<String>,
        valid_until: Option<chrono::DateTime<chrono::Utc>>,
        subtotal: rust_decimal::Decimal,
        tax_amount: rust_decimal::Decimal,
        total_amount: rust_decimal::Decimal,
        status: String,
        notes: Option<String>,
    }

    let source = sqlx::query_as::<_, Source>(
        r#"
        SELECT customer_id, quotation_number, subject, valid_until, subtotal, tax_amount,
               total_amount, status, notes
        FROM quotations WHERE id = $1 AND company_id = $2
        FOR UPDATE
        "#,
    )
    .bind(quotation_id)
    .bind(auth.company_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Quotation not found"))?;

    if source.status == QuotationStatus::Converted.as_str() {
        return Err(ApiError::conflict("Quotation has already been converted"));
    }

    let invoice_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoices
            (company_id, customer_id, quotation_id, invoice_number, subject, due_date, subtotal,
             tax_amount, total_amount, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(auth.company_id)
    .bind(source.customer_id)
    .bind(quotation_id)
    .bind(numbering::invoice_number())
    .bind(&source.subject)
    .bind(source.valid_until)
    .bind(source.subtotal)
    .bind(source.tax_amount)
    .bind(source.total_amount)
    .bind(InvoiceStatus::Draft.as_str())
    .bind(&source.notes)
    .fetch_one(&mut *tx)
    .await?;

    items::copy_items(
        &mut tx,
        DocumentKind::Quotation,
        quotation_id,
        DocumentKind::Invoice,
        invoice_id,
    )
    .await?;

    sqlx::query("UPDATE quotations SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(QuotationStatus::Converted.as_str())
        .bind(quotation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let invoice = sqlx::query_as::<_, Invoice>(&format!("{} WHERE i.id = $1", INVOICE_SELECT))
        .bind(invoice_id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(quotation_id, invoice_id, "Quotation converted to invoice");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "quotation_converted",
            format!(
                "Converted quotation {} to invoice {}",
                source.quotation_number, invoice.invoice_number
            ),
        )
        .resource("invoice", invoice_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(Created(invoice))
}

/// POST /api/v1/quotations/:id/duplicate
pub async fn duplicate_quotation(
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let original = load_quotation(&state, auth.company_id, quotation_id).await?;

    let mut tx = state.db.begin().await?;

    let copy_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quotations
            (company_id, customer_id, quotation_number, subject, valid_until, subtotal,
             tax_amount, total_amount, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(auth.company_id)
    .bind(original.customer_id)
    .bind(numbering::quotation_number())
    .bind(duplicate_subject(original.subject.as_deref()))
    .bind(original.valid_until)
    .bind(original.subtotal)
    .bind(original.tax_amount)
    .bind(original.total_amount)
    .bind(QuotationStatus::Draft.as_str())
    .bind(&original.notes)
    .fetch_one(&mut *tx)
    .await?;

    items::copy_items(
        &mut tx,
        DocumentKind::Quotation,
        quotation_id,
        DocumentKind::Quotation,
        copy_id,
    )
    .await?;

    tx.commit().await?;

    let copy = load_quotation(&state, auth.company_id, copy_id).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "quotation_duplicated",
            format!(
                "Duplicated quotation {} as {}",
                original.quotation_number, copy.quotation_number
            ),
        )
        .resource("quotation", copy_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(Created(detail(&state, copy).await?))
}
