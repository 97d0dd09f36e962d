//! Product catalogue types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::pricing::MAX_MONEY;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub unit_price: Decimal,
    pub cost_price: Option<Decimal>,
    pub tax_rate: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const PRODUCT_COLUMNS: &str = "id, company_id, name, description, sku, category, unit_price, \
     cost_price, tax_rate, is_active, created_at, updated_at";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "is required"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 100))]
    pub sku: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub unit_price: Decimal,
    #[serde(default)]
    pub cost_price: Option<Decimal>,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub sku: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub unit_price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProductListQuery {
    pub search: Option<String>,
    pub active: Option<bool>,
}

/// Prices must lie within 0..=MAX_MONEY and the tax rate be a percentage.
pub fn validate_pricing(
    unit_price: Option<Decimal>,
    cost_price: Option<Decimal>,
    tax_rate: Option<Decimal>,
) -> Result<(), String> {
    if unit_price.is_some_and(|p| p < Decimal::ZERO) {
        return Err("Unit price cannot be negative".to_string());
    }
    if cost_price.is_some_and(|p| p < Decimal::ZERO) {
        return Err("Cost price cannot be negative".to_string());
    }
    if unit_price.into_iter().chain(cost_price).any(|p| p > MAX_MONEY) {
        return Err("Price exceeds the maximum of 9999999999.99".to_string());
    }
    if tax_rate.is_some_and(|t| t < Decimal::ZERO || t > Decimal::ONE_HUNDRED) {
        return Err("Tax rate must be between 0 and 100".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_bounds() {
        assert!(validate_pricing(Some(Decimal::ZERO), None, Some(Decimal::ONE_HUNDRED)).is_ok());
        assert!(validate_pricing(Some(Decimal::NEGATIVE_ONE), None, None).is_err());
        assert!(validate_pricing(None, Some(Decimal::NEGATIVE_ONE), None).is_err());
        assert!(validate_pricing(None, None, Some(Decimal::from(101))).is_err());
        assert!(validate_pricing(Some(MAX_MONEY), Some(MAX_MONEY), None).is_ok());
        assert!(validate_pricing(Some(Decimal::MAX), None, None).is_err());
        assert!(validate_pricing(None, Some(MAX_MONEY + Decimal::ONE), None).is_err());
    }

    #[test]
    fn create_defaults() {
        let req: CreateProductRequest = serde_json::from_value(serde_json::json!({
            "name": "Widget",
            "unit_price": "9.99"
        }))
        .unwrap();
        assert!(req.is_active);
        assert_eq!(req.tax_rate, Decimal::ZERO);
    }
}
