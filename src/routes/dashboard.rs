//! Dashboard, charts, global search and the manager overview.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

use super::common::like_pattern;
use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::{RequireAuth, RequireManager};
use crate::domain::activities::{Activity, ACTIVITY_SELECT};
use crate::domain::audit::{AuditLog, AUDIT_SELECT};
use crate::domain::customers::{Customer, CUSTOMER_COLUMNS};
use crate::domain::dashboard::{
    conversion_rate, recent_months, ActiveUser, AdminOverview, DashboardData, DashboardStats,
    EntityCounts, GlobalSearchQuery, LeadChart, MonthBucket, MonthlyRevenue, RevenueChart,
    SearchResults, StatusCount, TopUser, CHART_COLORS,
};
use crate::domain::invoices::{InvoiceStatus, InvoiceSummary};
use crate::domain::leads::{Lead, LeadStatus, PipelineStats, LEAD_SELECT};
use crate::domain::products::{Product, PRODUCT_COLUMNS};
use crate::domain::quotations::QuotationSummary;
use crate::domain::tasks::{Task, TASK_SELECT};
use crate::error::{ApiError, ApiResult};
use crate::services::cache::keys;

const SEARCH_LIMIT: i64 = 10;

async fn count(db: &PgPool, table: &str, company_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE company_id = $1", table))
        .bind(company_id)
        .fetch_one(db)
        .await
}

/// Paid revenue dated in `[from, to)`; invoices without a payment date count from creation.
async fn paid_revenue(
    db: &PgPool,
    company_id: i64,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Decimal, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(total_amount), 0) FROM invoices
        WHERE company_id = $1 AND status = $2
          AND ($3::timestamptz IS NULL OR COALESCE(payment_date, created_at) >= $3)
          AND ($4::timestamptz IS NULL OR COALESCE(payment_date, created_at) < $4)
        "#,
    )
    .bind(company_id)
    .bind(InvoiceStatus::Paid.as_str())
    .bind(from)
    .bind(to)
    .fetch_one(db)
    .await
}

async fn month_revenue(
    db: &PgPool,
    company_id: i64,
    months: &[MonthBucket],
) -> Result<Vec<MonthlyRevenue>, sqlx::Error> {
    let sums = try_join_all(
        months
            .iter()
            .map(|m| paid_revenue(db, company_id, Some(m.start), Some(m.end))),
    )
    .await?;

    Ok(months
        .iter()
        .zip(sums)
        .map(|(month, revenue)| MonthlyRevenue {
            month: month.label(),
            revenue,
        })
        .collect())
}

async fn status_counts(db: &PgPool, company_id: i64) -> Result<Vec<StatusCount>, sqlx::Error> {
    sqlx::query_as::<_, StatusCount>(
        r#"
        SELECT status, COUNT(*) AS count FROM leads
        WHERE company_id = $1 GROUP BY status ORDER BY status
        "#,
    )
    .bind(company_id)
    .fetch_all(db)
    .await
}

async fn compute_dashboard(db: &PgPool, company_id: i64) -> Result<DashboardData, sqlx::Error> {
    let (total_leads, total_customers, total_quotations, total_invoices, total_revenue) =
        tokio::try_join!(
            count(db, "leads", company_id),
            count(db, "customers", company_id),
            count(db, "quotations", company_id),
            count(db, "invoices", company_id),
            paid_revenue(db, company_id, None, None),
        )?;

    let lead_statuses = status_counts(db, company_id).await?;
    let pairs: Vec<(String, i64)> = lead_statuses
        .iter()
        .map(|s| (s.status.clone(), s.count))
        .collect();

    let monthly_revenue = month_revenue(db, company_id, &recent_months(Utc::now(), 6)).await?;

    let recent_activities = sqlx::query_as::<_, Activity>(&format!(
        "{} WHERE a.company_id = $1 ORDER BY a.created_at DESC LIMIT 10",
        ACTIVITY_SELECT
    ))
    .bind(company_id)
    .fetch_all(db)
    .await?;

    let recent_leads = sqlx::query_as::<_, Lead>(&format!(
        "{} WHERE l.company_id = $1 ORDER BY l.created_at DESC LIMIT 5",
        LEAD_SELECT
    ))
    .bind(company_id)
    .fetch_all(db)
    .await?;

    let upcoming_tasks = sqlx::query_as::<_, Task>(&format!(
        r#"
        {} WHERE t.company_id = $1 AND t.status IN ('pending', 'in_progress')
        ORDER BY t.due_date ASC NULLS LAST LIMIT 5
        "#,
        TASK_SELECT
    ))
    .bind(company_id)
    .fetch_all(db)
    .await?;

    let top_users = sqlx::query_as::<_, TopUser>(
        r#"
        SELECT u.id, u.first_name, u.last_name,
               COUNT(DISTINCT l.id) AS leads_assigned,
               COUNT(DISTINCT c.id) AS customers_converted
        FROM users u
        LEFT JOIN leads l ON l.assigned_to_id = u.id
        LEFT JOIN customers c ON c.lead_id = l.id
        WHERE u.company_id = $1
        GROUP BY u.id, u.first_name, u.last_name
        ORDER BY leads_assigned DESC, u.id ASC
        LIMIT 5
        "#,
    )
    .bind(company_id)
    .fetch_all(db)
    .await?;

    Ok(DashboardData {
        total_leads,
        total_customers,
        total_quotations,
        total_invoices,
        total_revenue,
        conversion_rate: conversion_rate(total_customers, total_leads),
        pipeline_stats: PipelineStats::from_counts(&pairs),
        lead_statuses,
        monthly_revenue,
        recent_activities,
        recent_leads,
        upcoming_tasks,
        top_users,
    })
}

/// GET /api/v1/dashboard
///
/// Served from Redis when a fresh copy exists; cache errors fall through to the database.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let key = keys::dashboard(auth.company_id, auth.user_id);

    if let Some(cache) = &state.cache {
        if let Some(cached) = cache.get::<DashboardData>(&key).await {
            return Ok(DataResponse::new(cached));
        }
    }

    let data = compute_dashboard(&state.db, auth.company_id).await?;

    if let Some(cache) = &state.cache {
        if let Err(e) = cache.set(&key, &data).await {
            tracing::warn!(error = %e, "Failed to cache dashboard");
        }
    }

    Ok(DataResponse::new(data))
}

/// GET /api/v1/dashboard/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let db = &state.db;
    let company_id = auth.company_id;

    let today = async {
        sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM leads
                 WHERE company_id = $1 AND created_at >= date_trunc('day', NOW())),
                (SELECT COUNT(*) FROM activities
                 WHERE company_id = $1 AND created_at >= date_trunc('day', NOW())),
                (SELECT COUNT(*) FROM tasks
                 WHERE company_id = $1 AND status IN ('pending', 'in_progress'))
            "#,
        )
        .bind(company_id)
        .fetch_one(db)
        .await
    };

    let (total_leads, total_customers, (today_leads, today_activities, pending_tasks)) =
        tokio::try_join!(
            count(db, "leads", company_id),
            count(db, "customers", company_id),
            today,
        )?;

    Ok(DataResponse::new(DashboardStats {
        total_leads,
        total_customers,
        today_leads,
        today_activities,
        pending_tasks,
        last_updated: Utc::now(),
    }))
}

fn lead_chart(counts: &[StatusCount]) -> LeadChart {
    let by_status: HashMap<&str, i64> =
        counts.iter().map(|c| (c.status.as_str(), c.count)).collect();

    let mut chart = LeadChart {
        labels: Vec::new(),
        data: Vec::new(),
        colors: Vec::new(),
    };
    for (i, status) in LeadStatus::ALL.into_iter().enumerate() {
        chart.labels.push(status.label());
        chart.data.push(by_status.get(status.as_str()).copied().unwrap_or(0));
        chart.colors.push(CHART_COLORS[i % CHART_COLORS.len()]);
    }
    chart
}

/// GET /api/v1/dashboard/lead-chart
pub async fn lead_chart_data(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let counts = status_counts(&state.db, auth.company_id).await?;
    Ok(DataResponse::new(lead_chart(&counts)))
}

/// GET /api/v1/dashboard/revenue-chart
pub async fn revenue_chart(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let mut months = recent_months(Utc::now(), 12);
    months.reverse();

    let revenue = month_revenue(&state.db, auth.company_id, &months).await?;
    let (labels, data) = revenue.into_iter().map(|m| (m.month, m.revenue)).unzip();

    Ok(DataResponse::new(RevenueChart { labels, data }))
}

/// GET /api/v1/search?q=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GlobalSearchQuery>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let term = query.q.trim().to_string();
    let pattern = like_pattern(Some(term.as_str()))
        .ok_or_else(|| ApiError::bad_request("Search query is required"))?;
    let db = &state.db;
    let company_id = auth.company_id;

    let leads_sql = format!(
        r#"
        {} WHERE l.company_id = $1
          AND (l.first_name ILIKE $2 OR l.last_name ILIKE $2 OR l.email ILIKE $2
               OR l.company_name ILIKE $2)
        ORDER BY l.created_at DESC LIMIT $3
        "#,
        LEAD_SELECT
    );
    let customers_sql = format!(
        r#"
        SELECT {} FROM customers WHERE company_id = $1
          AND (first_name ILIKE $2 OR last_name ILIKE $2 OR email ILIKE $2
               OR company_name ILIKE $2)
        ORDER BY created_at DESC LIMIT $3
        "#,
        CUSTOMER_COLUMNS
    );
    let products_sql = format!(
        r#"
        SELECT {} FROM products WHERE company_id = $1
          AND (name ILIKE $2 OR description ILIKE $2 OR sku ILIKE $2)
        ORDER BY name ASC LIMIT $3
        "#,
        PRODUCT_COLUMNS
    );

    let leads = sqlx::query_as::<_, Lead>(&leads_sql)
    .bind(company_id)
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(db);

    let customers = sqlx::query_as::<_, Customer>(&customers_sql)
    .bind(company_id)
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(db);

    let products = sqlx::query_as::<_, Product>(&products_sql)
    .bind(company_id)
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(db);

    let quotations = sqlx::query_as::<_, QuotationSummary>(
        r#"
        SELECT id, quotation_number, subject, total_amount, status, created_at
        FROM quotations WHERE company_id = $1
          AND (quotation_number ILIKE $2 OR subject ILIKE $2)
        ORDER BY created_at DESC LIMIT $3
        "#,
    )
    .bind(company_id)
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(db);

    let invoices = sqlx::query_as::<_, InvoiceSummary>(
        r#"
        SELECT id, invoice_number, subject, total_amount, status, due_date, created_at
        FROM invoices WHERE company_id = $1
          AND (invoice_number ILIKE $2 OR subject ILIKE $2)
        ORDER BY created_at DESC LIMIT $3
        "#,
    )
    .bind(company_id)
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(db);

    let (leads, customers, products, quotations, invoices) =
        tokio::try_join!(leads, customers, products, quotations, invoices)?;

    Ok(DataResponse::new(SearchResults {
        query: term,
        leads,
        customers,
        products,
        quotations,
        invoices,
    }))
}

/// GET /api/v1/admin/overview
pub async fn admin_overview(
    State(state): State<Arc<AppState>>,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    let db = &state.db;
    let company_id = auth.company_id;

    let counts = sqlx::query_as::<_, EntityCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users WHERE company_id = $1) AS users,
            (SELECT COUNT(*) FROM leads WHERE company_id = $1) AS leads,
            (SELECT COUNT(*) FROM customers WHERE company_id = $1) AS customers,
            (SELECT COUNT(*) FROM products WHERE company_id = $1) AS products,
            (SELECT COUNT(*) FROM quotations WHERE company_id = $1) AS quotations,
            (SELECT COUNT(*) FROM invoices WHERE company_id = $1) AS invoices,
            (SELECT COUNT(*) FROM tasks WHERE company_id = $1) AS tasks
        "#,
    )
    .bind(company_id)
    .fetch_one(db)
    .await?;

    let month = MonthBucket::containing(Utc::now());
    let monthly_revenue = paid_revenue(db, company_id, Some(month.start), Some(month.end)).await?;

    let recent_audit_logs = sqlx::query_as::<_, AuditLog>(&format!(
        "{} WHERE al.company_id = $1 ORDER BY al.created_at DESC LIMIT 20",
        AUDIT_SELECT
    ))
    .bind(company_id)
    .fetch_all(db)
    .await?;

    let top_users = sqlx::query_as::<_, ActiveUser>(
        r#"
        SELECT u.id, u.first_name, u.last_name, COUNT(a.id) AS activity_count
        FROM users u
        LEFT JOIN activities a ON a.user_id = u.id
        WHERE u.company_id = $1
        GROUP BY u.id, u.first_name, u.last_name
        ORDER BY activity_count DESC, u.id ASC
        LIMIT 10
        "#,
    )
    .bind(company_id)
    .fetch_all(db)
    .await?;

    Ok(DataResponse::new(AdminOverview {
        counts,
        monthly_revenue,
        recent_audit_logs,
        top_users,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_chart_covers_every_stage() {
        let counts = vec![
            StatusCount {
                status: "closed_won".into(),
                count: 3,
            },
            StatusCount {
                status: "prospect".into(),
                count: 5,
            },
        ];
        let chart = lead_chart(&counts);

        assert_eq!(chart.labels.len(), LeadStatus::ALL.len());
        assert_eq!(chart.labels[0], "Prospect");
        assert_eq!(chart.data[0], 5);
        assert_eq!(chart.labels[5], "Closed Won");
        assert_eq!(chart.data[5], 3);
        assert_eq!(chart.data[1], 0);
        assert_eq!(chart.colors.len(), chart.labels.len());
    }
}
