//! Subscription and payment types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::plans::{Plan, PlanDetails, PlanLimits};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::PastDue => "past_due",
        }
    }
}

/// Length of one billing period.
pub const BILLING_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub company_id: i64,
    pub plan: String,
    pub stripe_subscription_id: Option<String>,
    pub razorpay_subscription_id: Option<String>,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const SUBSCRIPTION_COLUMNS: &str = "id, company_id, plan, stripe_subscription_id, \
     razorpay_subscription_id, status, current_period_start, current_period_end, \
     cancel_at_period_end, created_at, updated_at";

#[derive(Debug, Clone, Serialize)]
pub struct CurrentPlan {
    pub name: &'static str,
    pub value: Plan,
    pub max_users: i32,
    pub max_storage_gb: i32,
    pub features: &'static [&'static str],
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOverview {
    pub current_plan: CurrentPlan,
    pub subscription: Option<Subscription>,
    pub available_plans: Vec<PlanDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    pub plan: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageMetric {
    pub current: f64,
    pub limit: i32,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageResponse {
    pub plan: Plan,
    pub users: UsageMetric,
    pub storage_gb: UsageMetric,
}

#[derive(Debug, Clone, Serialize)]
pub struct StripeCheckout {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub publishable_key: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub plan: Plan,
}

#[derive(Debug, Clone, Serialize)]
pub struct RazorpayCheckout {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub key_id: Option<String>,
    pub plan: Plan,
}

/// Receipt reference attached to Razorpay orders.
pub fn razorpay_receipt(company_id: i64, plan: Plan, now: DateTime<Utc>) -> String {
    format!(
        "sub_{}_{}_{}",
        company_id,
        plan.as_str(),
        now.format("%Y%m%d_%H%M%S")
    )
}

impl CurrentPlan {
    pub fn new(plan: Plan, limits: PlanLimits) -> Self {
        Self {
            name: plan.display_name(),
            value: plan,
            max_users: limits.max_users,
            max_storage_gb: limits.max_storage_gb,
            features: plan.features(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn receipt_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap();
        assert_eq!(
            razorpay_receipt(42, Plan::Pro, now),
            "sub_42_pro_20240501_093005"
        );
    }
}
