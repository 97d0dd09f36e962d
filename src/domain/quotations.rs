//! Quotation domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::line_items::{LineItem, LineItemRequest};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Converted,
}

impl Default for QuotationStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl QuotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Converted => "converted",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Quotation {
    pub id: i64,
    pub company_id: i64,
    pub customer_id: i64,
    pub customer_name: Option<String>,
    pub quotation_number: String,
    pub subject: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expects `quotations q JOIN customers c ON c.id = q.customer_id`.
pub const QUOTATION_SELECT: &str = r#"
    SELECT q.id, q.company_id, q.customer_id,
           c.first_name || ' ' || c.last_name AS customer_name,
           q.quotation_number, q.subject, q.valid_until, q.subtotal, q.tax_amount,
           q.total_amount, q.status, q.notes, q.created_at, q.updated_at
    FROM quotations q
    JOIN customers c ON c.id = q.customer_id
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QuotationSummary {
    pub id: i64,
    pub quotation_number: String,
    pub subject: Option<String>,
    pub total_amount: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotationDetail {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub items: Vec<LineItem>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuotationRequest {
    pub customer_id: i64,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: QuotationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "must contain at least one item"))]
    pub items: Vec<LineItemRequest>,
}

/// `items`, when present, replaces every existing line.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateQuotationRequest {
    pub customer_id: Option<i64>,
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    pub status: Option<QuotationStatus>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "must contain at least one item"))]
    pub items: Option<Vec<LineItemRequest>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendDocumentRequest {
    #[validate(email(message = "must be a valid email"))]
    pub recipient_email: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DocumentListQuery {
    pub status: Option<String>,
    pub customer_id: Option<i64>,
    pub search: Option<String>,
}

pub fn duplicate_subject(subject: Option<&str>) -> String {
    format!("Copy of {}", subject.unwrap_or_default()).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_subject_prefixes_copy() {
        assert_eq!(duplicate_subject(Some("Q3 rollout")), "Copy of Q3 rollout");
        assert_eq!(duplicate_subject(None), "Copy of");
    }

    #[test]
    fn create_requires_items() {
        let req: CreateQuotationRequest =
            serde_json::from_value(serde_json::json!({ "customer_id": 1, "items": [] })).unwrap();
        assert!(req.validate().is_err());
        assert_eq!(req.status, QuotationStatus::Draft);
    }
}
