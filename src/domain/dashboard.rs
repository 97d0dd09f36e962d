//! Dashboard aggregates and calendar helpers.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::activities::Activity;
use super::leads::{Lead, PipelineStats};
use super::tasks::Task;

/// Lead chart palette, cycled by position.
pub const CHART_COLORS: [&str; 7] = [
    "#FF6384", "#36A2EB", "#FFCE56", "#4BC0C0", "#9966FF", "#FF9F40", "#FF6384",
];

/// One calendar month, `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MonthBucket {
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self::from_year_month(at.year(), at.month())
    }

    fn from_year_month(year: i32, month: u32) -> Self {
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        Self {
            start: month_start(year, month),
            end: month_start(next_year, next_month),
        }
    }

    pub fn previous(&self) -> Self {
        let (year, month) = if self.start.month() == 1 {
            (self.start.year() - 1, 12)
        } else {
            (self.start.year(), self.start.month() - 1)
        };
        Self::from_year_month(year, month)
    }

    /// Label such as `Mar 2024`.
    pub fn label(&self) -> String {
        self.start.format("%b %Y").to_string()
    }
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    // month is always 1..=12 here
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The `count` months ending with the month of `now`, newest first.
pub fn recent_months(now: DateTime<Utc>, count: usize) -> Vec<MonthBucket> {
    let mut months = Vec::with_capacity(count);
    let mut current = MonthBucket::containing(now);
    for _ in 0..count {
        months.push(current);
        current = current.previous();
    }
    months
}

/// Customers per lead as a percentage with one decimal, 0 without leads.
pub fn conversion_rate(total_customers: i64, total_leads: i64) -> f64 {
    if total_leads <= 0 {
        return 0.0;
    }
    let rate = total_customers as f64 / total_leads as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyRevenue {
    pub month: String,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TopUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub leads_assigned: i64,
    pub customers_converted: i64,
}

/// Cached per (company, user) as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    pub total_leads: i64,
    pub total_customers: i64,
    pub total_quotations: i64,
    pub total_invoices: i64,
    pub total_revenue: Decimal,
    pub conversion_rate: f64,
    pub lead_statuses: Vec<StatusCount>,
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub recent_activities: Vec<Activity>,
    pub recent_leads: Vec<Lead>,
    pub pipeline_stats: PipelineStats,
    pub upcoming_tasks: Vec<Task>,
    pub top_users: Vec<TopUser>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_leads: i64,
    pub total_customers: i64,
    pub today_leads: i64,
    pub today_activities: i64,
    pub pending_tasks: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadChart {
    pub labels: Vec<&'static str>,
    pub data: Vec<i64>,
    pub colors: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueChart {
    pub labels: Vec<String>,
    pub data: Vec<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalSearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub leads: Vec<Lead>,
    pub customers: Vec<super::customers::Customer>,
    pub products: Vec<super::products::Product>,
    pub quotations: Vec<super::quotations::QuotationSummary>,
    pub invoices: Vec<super::invoices::InvoiceSummary>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EntityCounts {
    pub users: i64,
    pub leads: i64,
    pub customers: i64,
    pub products: i64,
    pub quotations: i64,
    pub invoices: i64,
    pub tasks: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActiveUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub activity_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminOverview {
    pub counts: EntityCounts,
    pub monthly_revenue: Decimal,
    pub recent_audit_logs: Vec<super::audit::AuditLog>,
    pub top_users: Vec<ActiveUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn months_walk_back_across_year_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 18, 0, 0).unwrap();
        let months = recent_months(now, 4);
        let labels: Vec<String> = months.iter().map(MonthBucket::label).collect();
        assert_eq!(labels, vec!["Feb 2024", "Jan 2024", "Dec 2023", "Nov 2023"]);
        assert_eq!(months[0].start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(months[0].end, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(months[2].end, months[1].start);
    }

    #[test]
    fn december_bucket_ends_in_january() {
        let bucket =
            MonthBucket::containing(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap());
        assert_eq!(bucket.end, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn conversion_rate_rounds_and_handles_zero() {
        assert_eq!(conversion_rate(1, 3), 33.3);
        assert_eq!(conversion_rate(2, 3), 66.7);
        assert_eq!(conversion_rate(5, 0), 0.0);
    }
}
