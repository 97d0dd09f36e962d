//! Invoice domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::line_items::{LineItem, LineItemRequest};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: i64,
    pub company_id: i64,
    pub customer_id: i64,
    pub customer_name: Option<String>,
    pub quotation_id: Option<i64>,
    pub invoice_number: String,
    pub subject: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expects `invoices i JOIN customers c ON c.id = i.customer_id`.
pub const INVOICE_SELECT: &str = r#"
    SELECT i.id, i.company_id, i.customer_id,
           c.first_name || ' ' || c.last_name AS customer_name,
           i.quotation_id, i.invoice_number, i.subject, i.due_date, i.subtotal,
           i.tax_amount, i.total_amount, i.status, i.payment_date, i.notes,
           i.created_at, i.updated_at
    FROM invoices i
    JOIN customers c ON c.id = i.customer_id
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InvoiceSummary {
    pub id: i64,
    pub invoice_number: String,
    pub subject: Option<String>,
    pub total_amount: Decimal,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<LineItem>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub customer_id: i64,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "must contain at least one item"))]
    pub items: Vec<LineItemRequest>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateInvoiceRequest {
    pub customer_id: Option<i64>,
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: Option<InvoiceStatus>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "must contain at least one item"))]
    pub items: Option<Vec<LineItemRequest>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayInvoiceRequest {
    #[serde(default)]
    pub payment_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_request_requires_items() {
        let req: CreateInvoiceRequest =
            serde_json::from_value(json!({ "customer_id": 1, "items": [] })).unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("items"));

        let req: CreateInvoiceRequest =
            serde_json::from_value(json!({ "customer_id": 1, "items": [{ "product_id": 3 }] }))
                .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.status, InvoiceStatus::Draft);
    }
}
