//! Invoice routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use super::common::{ensure_company_customer, filter_value, like_pattern};
use super::line_items::{self as items, DocumentKind};
use crate::api::{Created, DataResponse, MessageResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::invoices::{
    CreateInvoiceRequest, Invoice, InvoiceDetail, InvoiceStatus, PayInvoiceRequest,
    UpdateInvoiceRequest, INVOICE_SELECT,
};
use crate::domain::numbering;
use crate::domain::quotations::{duplicate_subject, DocumentListQuery, SendDocumentRequest};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};
use crate::services::cache::invalidate_dashboard;

const INVOICE_FILTER: &str = r#"
    WHERE i.company_id = $1
      AND ($2::text IS NULL OR i.status = $2)
      AND ($3::bigint IS NULL OR i.customer_id = $3)
      AND ($4::text IS NULL OR i.invoice_number ILIKE $4 OR i.subject ILIKE $4)
"#;

async fn load_invoice(state: &AppState, company_id: i64, invoice_id: i64) -> ApiResult<Invoice> {
    sqlx::query_as::<_, Invoice>(&format!(
        "{} WHERE i.id = $1 AND i.company_id = $2",
        INVOICE_SELECT
    ))
    .bind(invoice_id)
    .bind(company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Invoice not found"))
}

async fn detail(state: &AppState, invoice: Invoice) -> ApiResult<InvoiceDetail> {
    let items = items::load_items(&state.db, DocumentKind::Invoice, invoice.id).await?;
    Ok(InvoiceDetail { invoice, items })
}

/// Flips the tenant's sent invoices whose due date has passed to overdue.
async fn refresh_overdue(state: &AppState, company_id: i64) -> ApiResult<u64> {
    let updated = sqlx::query(
        r#"
        UPDATE invoices SET status = $1, updated_at = NOW()
        WHERE company_id = $2 AND status = $3 AND due_date IS NOT NULL AND due_date < NOW()
        "#,
    )
    .bind(InvoiceStatus::Overdue.as_str())
    .bind(company_id)
    .bind(InvoiceStatus::Sent.as_str())
    .execute(&state.db)
    .await?;

    if updated.rows_affected() > 0 {
        tracing::debug!(company_id, count = updated.rows_affected(), "Invoices marked overdue");
    }
    Ok(updated.rows_affected())
}

/// GET /api/v1/invoices
pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<DocumentListQuery>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    refresh_overdue(&state, auth.company_id).await?;

    let status = filter_value(filters.status.as_deref());
    let search = like_pattern(filters.search.as_deref());

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM invoices i {}", INVOICE_FILTER))
            .bind(auth.company_id)
            .bind(status)
            .bind(filters.customer_id)
            .bind(&search)
            .fetch_one(&state.db)
            .await?;

    let invoices = sqlx::query_as::<_, Invoice>(&format!(
        "{} {} ORDER BY i.created_at DESC LIMIT $5 OFFSET $6",
        INVOICE_SELECT, INVOICE_FILTER
    ))
    .bind(auth.company_id)
    .bind(status)
    .bind(filters.customer_id)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(invoices, &pagination, total))
}

/// POST /api/v1/invoices
pub async fn create_invoice(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<CreateInvoiceRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let mut tx = state.db.begin().await?;
    ensure_company_customer(&mut *tx, auth.company_id, req.customer_id).await?;
    let (lines, totals) = items::price_items(&mut tx, auth.company_id, &req.items).await?;

    let invoice_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoices
            (company_id, customer_id, invoice_number, subject, due_date, subtotal, tax_amount,
             total_amount, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(auth.company_id)
    .bind(req.customer_id)
    .bind(numbering::invoice_number())
    .bind(&req.subject)
    .bind(req.due_date)
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.total_amount)
    .bind(req.status.as_str())
    .bind(&req.notes)
    .fetch_one(&mut *tx)
    .await?;

    items::insert_items(&mut tx, DocumentKind::Invoice, invoice_id, &lines).await?;
    tx.commit().await?;

    let invoice = load_invoice(&state, auth.company_id, invoice_id).await?;
    tracing::info!(
        company_id = auth.company_id,
        invoice_id,
        number = %invoice.invoice_number,
        "Invoice created"
    );

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "invoice_created",
            format!("Created invoice {}", invoice.invoice_number),
        )
        .resource("invoice", invoice_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(Created(detail(&state, invoice).await?))
}

/// GET /api/v1/invoices/:id
pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<i64>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let invoice = load_invoice(&state, auth.company_id, invoice_id).await?;
    Ok(DataResponse::new(detail(&state, invoice).await?))
}

/// PUT /api/v1/invoices/:id
pub async fn update_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<UpdateInvoiceRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let mut tx = state.db.begin().await?;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM invoices WHERE id = $1 AND company_id = $2)",
    )
    .bind(invoice_id)
    .bind(auth.company_id)
    .fetch_one(&mut *tx)
    .await?;
    if !exists {
        return Err(ApiError::not_found("Invoice not found"));
    }

    if let Some(customer_id) = req.customer_id {
        ensure_company_customer(&mut *tx, auth.company_id, customer_id).await?;
    }

    let totals = match &req.items {
        Some(requested) => {
            let (lines, totals) = items::price_items(&mut tx, auth.company_id, requested).await?;
            items::delete_items(&mut tx, DocumentKind::Invoice, invoice_id).await?;
            items::insert_items(&mut tx, DocumentKind::Invoice, invoice_id, &lines).await?;
            Some(totals)
        }
        None => None,
    };

    // Marking paid through a plain update still stamps the payment date.
    let paid_now = req.status == Some(InvoiceStatus::Paid);

    sqlx::query(
        r#"
        UPDATE invoices SET
            customer_id = COALESCE($1, customer_id),
            subject = COALESCE($2, subject),
            due_date = COALESCE($3, due_date),
            status = COALESCE($4, status),
            notes = COALESCE($5, notes),
            subtotal = COALESCE($6, subtotal),
            tax_amount = COALESCE($7, tax_amount),
            total_amount = COALESCE($8, total_amount),
            payment_date = CASE WHEN $9 THEN COALESCE(payment_date, NOW()) ELSE payment_date END,
            updated_at = NOW()
        WHERE id = $10 AND company_id = $11
        "#,
    )
    .bind(req.customer_id)
    .bind(&req.subject)
    .bind(req.due_date)
    .bind(req.status.map(|s| s.as_str()))
    .bind(&req.notes)
    .bind(totals.map(|t| t.subtotal))
    .bind(totals.map(|t| t.tax_amount))
    .bind(totals.map(|t| t.total_amount))
    .bind(paid_now)
    .bind(invoice_id)
    .bind(auth.company_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let invoice = load_invoice(&state, auth.company_id, invoice_id).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "invoice_updated",
            format!("Updated invoice {}", invoice.invoice_number),
        )
        .resource("invoice", invoice_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(DataResponse::new(detail(&state, invoice).await?))
}

/// DELETE /api/v1/invoices/:id
pub async fn delete_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let number: String = sqlx::query_scalar(
        "DELETE FROM invoices WHERE id = $1 AND company_id = $2 RETURNING invoice_number",
    )
    .bind(invoice_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Invoice not found"))?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "invoice_deleted",
            format!("Deleted invoice {}", number),
        )
        .resource("invoice", invoice_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/invoices/:id/send
pub async fn send_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<SendDocumentRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let invoice = load_invoice(&state, auth.company_id, invoice_id).await?;

    let subject = req
        .subject
        .clone()
        .unwrap_or_else(|| format!("Invoice {}", invoice.invoice_number));
    let mut body = items::summary_email(
        "Invoice",
        &invoice.invoice_number,
        invoice.subject.as_deref(),
        invoice.total_amount,
        req.message.as_deref(),
    );
    if let Some(due) = invoice.due_date {
        body.push_str(&format!("Due: {}\n", due.format("%Y-%m-%d")));
    }
    let delivered = state
        .mailer
        .send_best_effort(req.recipient_email.trim(), &subject, body)
        .await;

    // A paid invoice keeps its status when re-sent.
    sqlx::query(
        r#"
        UPDATE invoices SET status = $1, updated_at = NOW()
        WHERE id = $2 AND company_id = $3 AND status <> $4
        "#,
    )
    .bind(InvoiceStatus::Sent.as_str())
    .bind(invoice_id)
    .bind(auth.company_id)
    .bind(InvoiceStatus::Paid.as_str())
    .execute(&state.db)
    .await?;

    tracing::info!(invoice_id, delivered, "Invoice sent");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "invoice_sent",
            format!(
                "Sent invoice {} to {}",
                invoice.invoice_number,
                req.recipient_email.trim()
            ),
        )
        .resource("invoice", invoice_id),
        &meta,
    )
    .await;

    Ok(MessageResponse::new("Invoice sent successfully"))
}

/// POST /api/v1/invoices/:id/pay
pub async fn pay_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    body: Option<Json<PayInvoiceRequest>>,
) -> ApiResult<impl IntoResponse> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let invoice = load_invoice(&state, auth.company_id, invoice_id).await?;

    if invoice.status == InvoiceStatus::Paid.as_str() {
        return Err(ApiError::conflict("Invoice is already paid"));
    }

    let payment_date = req.payment_date.unwrap_or_else(Utc::now);
    let updated = sqlx::query(
        r#"
        UPDATE invoices SET status = $1, payment_date = $2, updated_at = NOW()
        WHERE id = $3 AND company_id = $4 AND status <> $1
        "#,
    )
    .bind(InvoiceStatus::Paid.as_str())
    .bind(payment_date)
    .bind(invoice_id)
    .bind(auth.company_id)
    .execute(&state.db)
    .await?;

    // Lost a race with a concurrent payment.
    if updated.rows_affected() == 0 {
        return Err(ApiError::conflict("Invoice is already paid"));
    }

    tracing::info!(invoice_id, total = %invoice.total_amount, "Invoice paid");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "invoice_paid",
            format!("Invoice {} marked as paid", invoice.invoice_number),
        )
        .resource("invoice", invoice_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    let invoice = load_invoice(&state, auth.company_id, invoice_id).await?;
    Ok(DataResponse::new(invoice))
}

/// POST /api/v1/invoices/:id/duplicate
pub async fn duplicate_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let original = load_invoice(&state, auth.company_id, invoice_id).await?;

    let mut tx = state.db.begin().await?;

    let copy_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoices
            (company_id, customer_id, invoice_number, subject, due_date, subtotal, tax_amount,
             total_amount, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(auth.company_id)
    .bind(original.customer_id)
    .bind(numbering::invoice_number())
    .bind(duplicate_subject(original.subject.as_deref()))
    .bind(original.due_date)
    .bind(original.subtotal)
    .bind(original.tax_amount)
    .bind(original.total_amount)
    .bind(InvoiceStatus::Draft.as_str())
    .bind(&original.notes)
    .fetch_one(&mut *tx)
    .await?;

    items::copy_items(
        &mut tx,
        DocumentKind::Invoice,
        invoice_id,
        DocumentKind::Invoice,
        copy_id,
    )
    .await?;

    tx.commit().await?;

    let copy = load_invoice(&state, auth.company_id, copy_id).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "invoice_duplicated",
            format!(
                "Duplicated invoice {} as {}",
                original.invoice_number, copy.invoice_number
            ),
        )
        .resource("invoice", copy_id),
        &meta,
    )
    .await;
    invalidate_dashboard(state.cache.as_ref(), auth.company_id).await;

    Ok(Created(detail(&state, copy).await?))
}
