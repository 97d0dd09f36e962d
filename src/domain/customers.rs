//! Customer domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::invoices::InvoiceSummary;
use super::quotations::QuotationSummary;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
    pub id: i64,
    pub company_id: i64,
    pub lead_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub payment_terms: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const CUSTOMER_COLUMNS: &str = "id, company_id, lead_id, first_name, last_name, email, phone, \
     company_name, address, tax_id, credit_limit, payment_terms, created_at, updated_at";

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: Customer,
    pub quotations: Vec<QuotationSummary>,
    pub invoices: Vec<InvoiceSummary>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub last_name: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub company_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub credit_limit: Option<Decimal>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub payment_terms: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub company_name: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
    pub credit_limit: Option<Decimal>,
    #[validate(length(max = 100))]
    pub payment_terms: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchQuery {
    pub search: Option<String>,
}

/// Credit limits cannot be negative.
pub fn validate_credit_limit(limit: Option<Decimal>) -> Result<(), String> {
    match limit {
        Some(value) if value < Decimal::ZERO => Err("Credit limit cannot be negative".to_string()),
        _ => Ok(()),
    }
}
