//! Billing routes
//!
//! Plan catalogue, subscription changes, usage, gateway checkouts and the
//! public payment webhooks.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireManager;
use crate::domain::billing::{
    razorpay_receipt, CurrentPlan, PlanRequest, RazorpayCheckout, StripeCheckout, Subscription,
    SubscriptionOverview, SubscriptionStatus, UsageMetric, UsageResponse, BILLING_PERIOD_DAYS,
    SUBSCRIPTION_COLUMNS,
};
use crate::domain::plans::{self, Plan, PlanLimits};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};
use crate::services::payments::{
    self, tag_from_notes, PaymentTag, RazorpayEvent, StripeEvent, STRIPE_SIGNATURE_TOLERANCE_SECS,
};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Tenant tables counted towards the storage estimate.
const STORAGE_TABLES: [&str; 9] = [
    "users",
    "leads",
    "customers",
    "products",
    "quotations",
    "invoices",
    "tasks",
    "activities",
    "audit_logs",
];

#[derive(sqlx::FromRow)]
struct CompanyPlanRow {
    subscription_plan: String,
    max_users: i32,
    max_storage_gb: i32,
}

async fn company_plan(db: &PgPool, company_id: i64) -> ApiResult<(Plan, PlanLimits)> {
    let row = sqlx::query_as::<_, CompanyPlanRow>(
        "SELECT subscription_plan, max_users, max_storage_gb FROM companies WHERE id = $1",
    )
    .bind(company_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Company not found"))?;

    let plan = Plan::parse(&row.subscription_plan).unwrap_or_default();
    Ok((
        plan,
        PlanLimits {
            max_users: row.max_users,
            max_storage_gb: row.max_storage_gb,
        },
    ))
}

fn parse_plan(value: &str) -> ApiResult<Plan> {
    Plan::parse(value.trim().to_lowercase().as_str())
        .ok_or_else(|| ApiError::bad_request("Invalid plan"))
}

/// Which gateway reference a plan change carries.
enum GatewayRef<'a> {
    None,
    Stripe(&'a str),
    Razorpay(&'a str),
}

/// Moves the company onto `plan` and starts a fresh billing period.
async fn apply_plan(
    db: &PgPool,
    company_id: i64,
    plan: Plan,
    gateway: GatewayRef<'_>,
) -> ApiResult<Subscription> {
    let limits = plan.limits();
    let now = Utc::now();
    let period_end = now + Duration::days(BILLING_PERIOD_DAYS);
    let (stripe_id, razorpay_id) = match gateway {
        GatewayRef::None => (None, None),
        GatewayRef::Stripe(id) => (Some(id), None),
        GatewayRef::Razorpay(id) => (None, Some(id)),
    };

    let mut tx = db.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE companies SET
            subscription_plan = $1, max_users = $2, max_storage_gb = $3,
            subscription_start_date = $4, subscription_end_date = $5, updated_at = NOW()
        WHERE id = $6
        "#,
    )
    .bind(plan.as_str())
    .bind(limits.max_users)
    .bind(limits.max_storage_gb)
    .bind(now)
    .bind(period_end)
    .bind(company_id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Company not found"));
    }

    let subscription = sqlx::query_as::<_, Subscription>(&format!(
        r#"
        INSERT INTO subscriptions
            (company_id, plan, stripe_subscription_id, razorpay_subscription_id, status,
             current_period_start, current_period_end, cancel_at_period_end)
        VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
        ON CONFLICT (company_id) DO UPDATE SET
            plan = EXCLUDED.plan,
            stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id,
                                              subscriptions.stripe_subscription_id),
            razorpay_subscription_id = COALESCE(EXCLUDED.razorpay_subscription_id,
                                                subscriptions.razorpay_subscription_id),
            status = EXCLUDED.status,
            current_period_start = EXCLUDED.current_period_start,
            current_period_end = EXCLUDED.current_period_end,
            cancel_at_period_end = FALSE,
            updated_at = NOW()
        RETURNING {}
        "#,
        SUBSCRIPTION_COLUMNS
    ))
    .bind(company_id)
    .bind(plan.as_str())
    .bind(stripe_id)
    .bind(razorpay_id)
    .bind(SubscriptionStatus::Active.as_str())
    .bind(now)
    .bind(period_end)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(company_id, plan = plan.as_str(), "Subscription plan applied");
    Ok(subscription)
}

/// GET /api/v1/billing/subscription
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    let (plan, limits) = company_plan(&state.db, auth.company_id).await?;

    let subscription = sqlx::query_as::<_, Subscription>(&format!(
        "SELECT {} FROM subscriptions WHERE company_id = $1",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?;

    Ok(DataResponse::new(SubscriptionOverview {
        current_plan: CurrentPlan::new(plan, limits),
        subscription,
        available_plans: Plan::catalogue(),
    }))
}

/// POST /api/v1/billing/subscription/upgrade
pub async fn upgrade_subscription(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireManager,
    Json(req): Json<PlanRequest>,
) -> ApiResult<impl IntoResponse> {
    let target = parse_plan(&req.plan)?;
    let (current, _) = company_plan(&state.db, auth.company_id).await?;

    if !current.can_upgrade_to(target) {
        return Err(ApiError::bad_request("Invalid upgrade path"));
    }

    let subscription = apply_plan(&state.db, auth.company_id, target, GatewayRef::None).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "subscription_upgraded",
            format!("Upgraded to {} plan", target.as_str()),
        )
        .resource("subscription", subscription.id),
        &meta,
    )
    .await;

    Ok(DataResponse::new(subscription))
}

/// POST /api/v1/billing/subscription/cancel
pub async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    let subscription = sqlx::query_as::<_, Subscription>(&format!(
        r#"
        UPDATE subscriptions SET status = $1, cancel_at_period_end = TRUE, updated_at = NOW()
        WHERE company_id = $2
        RETURNING {}
        "#,
        SUBSCRIPTION_COLUMNS
    ))
    .bind(SubscriptionStatus::Canceled.as_str())
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("No active subscription found"))?;

    tracing::info!(company_id = auth.company_id, "Subscription canceled");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "subscription_canceled",
            "Subscription canceled",
        )
        .resource("subscription", subscription.id),
        &meta,
    )
    .await;

    Ok(DataResponse::new(subscription))
}

/// Approximate on-disk size of the tenant's rows.
async fn storage_bytes(db: &PgPool, company_id: i64) -> ApiResult<i64> {
    let mut total = 0i64;
    for table in STORAGE_TABLES {
        let bytes: i64 = sqlx::query_scalar(&format!(
            "SELECT COALESCE(SUM(pg_column_size(t.*)), 0)::bigint \
             FROM {} t WHERE t.company_id = $1",
            table
        ))
        .bind(company_id)
        .fetch_one(db)
        .await?;
        total += bytes;
    }
    Ok(total)
}

fn usage_metric(current: f64, limit: i32) -> UsageMetric {
    UsageMetric {
        current,
        limit,
        percentage: plans::usage_percentage(current, limit),
    }
}

/// GET /api/v1/billing/usage
pub async fn usage(
    State(state): State<Arc<AppState>>,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    let (plan, limits) = company_plan(&state.db, auth.company_id).await?;
    let users = super::common::active_user_count(&state.db, auth.company_id).await?;
    let bytes = storage_bytes(&state.db, auth.company_id).await?;
    let storage_gb = (bytes as f64 / BYTES_PER_GB * 1000.0).round() / 1000.0;

    Ok(DataResponse::new(UsageResponse {
        plan,
        users: usage_metric(users as f64, limits.max_users),
        storage_gb: usage_metric(storage_gb, limits.max_storage_gb),
    }))
}

fn checkout_tag(company_id: i64, user_id: i64, plan: Plan) -> PaymentTag {
    PaymentTag {
        company_id,
        user_id,
        plan: plan.as_str().to_string(),
    }
}

/// POST /api/v1/billing/payments/stripe
pub async fn stripe_payment(
    State(state): State<Arc<AppState>>,
    auth: RequireManager,
    Json(req): Json<PlanRequest>,
) -> ApiResult<impl IntoResponse> {
    let plan = parse_plan(&req.plan)?;
    let amount = plan.price_minor_units();
    let tag = checkout_tag(auth.company_id, auth.user_id, plan);

    let intent = state
        .payments
        .create_stripe_intent(amount as i64, &tag)
        .await?;
    let client_secret = intent
        .client_secret
        .ok_or_else(|| ApiError::internal("Stripe returned no client secret"))?;

    Ok(DataResponse::new(StripeCheckout {
        client_secret,
        payment_intent_id: intent.id,
        publishable_key: state.payments.stripe_publishable_key().map(str::to_string),
        amount: intent.amount,
        currency: intent.currency,
        plan,
    }))
}

/// POST /api/v1/billing/payments/razorpay
pub async fn razorpay_payment(
    State(state): State<Arc<AppState>>,
    auth: RequireManager,
    Json(req): Json<PlanRequest>,
) -> ApiResult<impl IntoResponse> {
    let plan = parse_plan(&req.plan)?;
    // Plan prices are charged as the same figure in rupees.
    let amount = plan.price_minor_units();
    let receipt = razorpay_receipt(auth.company_id, plan, Utc::now());
    let tag = checkout_tag(auth.company_id, auth.user_id, plan);

    let order = state
        .payments
        .create_razorpay_order(amount as i64, &receipt, &tag)
        .await?;

    Ok(DataResponse::new(RazorpayCheckout {
        order_id: order.id,
        amount: order.amount,
        currency: order.currency,
        receipt: order.receipt.unwrap_or(receipt),
        key_id: state.payments.razorpay_key_id().map(str::to_string),
        plan,
    }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn user_ref(tag: &PaymentTag) -> Option<i64> {
    (tag.user_id > 0).then_some(tag.user_id)
}

/// POST /api/v1/billing/webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let signature = header_str(&headers, "stripe-signature")
        .ok_or_else(|| ApiError::bad_request("Missing Stripe-Signature header"))?;
    let secret = state
        .payments
        .stripe_webhook_secret()
        .ok_or_else(|| ApiError::bad_request("Stripe webhooks are not configured"))?;

    payments::verify_stripe_signature(
        signature,
        &body,
        secret,
        Utc::now().timestamp(),
        STRIPE_SIGNATURE_TOLERANCE_SECS,
    )
    .map_err(|reason| {
        tracing::warn!(reason, "Rejected Stripe webhook");
        ApiError::bad_request("Invalid signature")
    })?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("Invalid webhook payload"))?;
    let intent = &event.data.object;
    let notes = serde_json::to_value(&intent.metadata).unwrap_or_default();
    let tag = tag_from_notes(&notes);

    match (event.event_type.as_str(), tag) {
        ("payment_intent.succeeded", Some(tag)) => {
            let plan = parse_plan(&tag.plan)?;
            let subscription =
                apply_plan(&state.db, tag.company_id, plan, GatewayRef::Stripe(&intent.id)).await?;
            audit::record(
                &state.db,
                AuditEntry::new(
                    tag.company_id,
                    user_ref(&tag),
                    "stripe_payment_success",
                    format!("Payment successful for {} plan", plan.as_str()),
                )
                .resource("subscription", subscription.id),
                &meta,
            )
            .await;
        }
        ("payment_intent.payment_failed", Some(tag)) => {
            sqlx::query(
                "UPDATE subscriptions SET status = $1, updated_at = NOW() WHERE company_id = $2",
            )
            .bind(SubscriptionStatus::PastDue.as_str())
            .bind(tag.company_id)
            .execute(&state.db)
            .await?;
            tracing::warn!(
                company_id = tag.company_id,
                intent_id = %intent.id,
                "Stripe payment failed"
            );
            audit::record(
                &state.db,
                AuditEntry::new(
                    tag.company_id,
                    user_ref(&tag),
                    "stripe_payment_failed",
                    "Payment failed",
                ),
                &meta,
            )
            .await;
        }
        (other, _) => {
            tracing::debug!(event_type = other, "Ignoring Stripe event");
        }
    }

    Ok(MessageResponse::new("Webhook processed"))
}

/// POST /api/v1/billing/webhooks/razorpay
pub async fn razorpay_webhook(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let signature = header_str(&headers, "x-razorpay-signature")
        .ok_or_else(|| ApiError::bad_request("Missing X-Razorpay-Signature header"))?;
    let secret = state
        .payments
        .razorpay_webhook_secret()
        .ok_or_else(|| ApiError::bad_request("Razorpay webhooks are not configured"))?;

    if !payments::verify_razorpay_signature(&body, signature, secret) {
        tracing::warn!("Rejected Razorpay webhook");
        return Err(ApiError::bad_request("Invalid signature"));
    }

    let event: RazorpayEvent = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("Invalid webhook payload"))?;

    if event.event != "payment.captured" {
        tracing::debug!(event = %event.event, "Ignoring Razorpay event");
        return Ok(MessageResponse::new("Webhook processed"));
    }

    let Some(payment) = event.payload.payment.map(|p| p.entity) else {
        return Err(ApiError::bad_request("Invalid webhook payload"));
    };
    let Some(tag) = tag_from_notes(&payment.notes) else {
        tracing::warn!(payment_id = %payment.id, "Razorpay payment without plan notes");
        return Ok(MessageResponse::new("Webhook processed"));
    };

    let plan = parse_plan(&tag.plan)?;
    let subscription =
        apply_plan(&state.db, tag.company_id, plan, GatewayRef::Razorpay(&payment.id)).await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            tag.company_id,
            user_ref(&tag),
            "razorpay_payment_success",
            format!("Payment successful for {} plan", plan.as_str()),
        )
        .resource("subscription", subscription.id),
        &meta,
    )
    .await;

    Ok(MessageResponse::new("Webhook processed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_names_are_case_insensitive() {
        assert_eq!(parse_plan(" Pro ").ok(), Some(Plan::Pro));
        assert!(parse_plan("gold").is_err());
    }

    #[test]
    fn unlimited_usage_reports_zero_percent() {
        let metric = usage_metric(12.0, plans::UNLIMITED);
        assert_eq!(metric.percentage, 0.0);
        assert_eq!(usage_metric(5.0, 20).percentage, 25.0);
    }

    #[test]
    fn webhook_user_zero_means_no_user() {
        let mut tag = checkout_tag(3, 0, Plan::Pro);
        assert_eq!(user_ref(&tag), None);
        tag.user_id = 9;
        assert_eq!(user_ref(&tag), Some(9));
    }
}
