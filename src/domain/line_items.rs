//! Line items shared by quotations and invoices.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::pricing::{DocumentTotals, LineAmounts, LineInput};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LineItem {
    pub id: i64,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub tax_rate: Decimal,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub product_id: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    /// Defaults to the product's price.
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub discount_percent: Decimal,
    /// Defaults to the product's tax rate.
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
}

fn default_quantity() -> i32 {
    1
}

/// Catalogue values used to fill in omitted item fields.
#[derive(Debug, Clone, FromRow)]
pub struct ProductPricing {
    pub id: i64,
    pub name: String,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
}

/// A line ready to insert, with its computed total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: i64,
    pub description: Option<String>,
    pub input: LineInput,
    pub amounts: LineAmounts,
}

impl LineItemRequest {
    pub fn price(&self, product: &ProductPricing) -> Result<PricedLine, String> {
        let input = LineInput {
            quantity: self.quantity,
            unit_price: self.unit_price.unwrap_or(product.unit_price),
            discount_percent: self.discount_percent,
            tax_rate: self.tax_rate.unwrap_or(product.tax_rate),
        };
        input.validate()?;
        let amounts = input.amounts()?;
        Ok(PricedLine {
            product_id: product.id,
            description: self
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .or_else(|| Some(product.name.clone())),
            amounts,
            input,
        })
    }
}

pub fn totals(lines: &[PricedLine]) -> Result<DocumentTotals, String> {
    DocumentTotals::from_lines(lines.iter().map(|l| &l.amounts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn product() -> ProductPricing {
        ProductPricing {
            id: 7,
            name: "Support plan".into(),
            unit_price: Decimal::from_str("50.00").unwrap(),
            tax_rate: Decimal::from(10),
        }
    }

    #[test]
    fn omitted_fields_come_from_product() {
        let req: LineItemRequest =
            serde_json::from_value(serde_json::json!({ "product_id": 7, "quantity": 2 })).unwrap();
        let line = req.price(&product()).unwrap();
        assert_eq!(line.input.unit_price, Decimal::from(50));
        assert_eq!(line.amounts.total, Decimal::from(110));
        assert_eq!(line.description.as_deref(), Some("Support plan"));
    }

    #[test]
    fn explicit_fields_override_product() {
        let req: LineItemRequest = serde_json::from_value(serde_json::json!({
            "product_id": 7,
            "unit_price": "20",
            "tax_rate": "0",
            "discount_percent": "50",
            "description": "Discounted"
        }))
        .unwrap();
        let line = req.price(&product()).unwrap();
        assert_eq!(line.amounts.total, Decimal::from(10));
        assert_eq!(totals(&[line]).unwrap().subtotal, Decimal::from(10));
    }

    #[test]
    fn invalid_quantity_is_rejected() {
        let req: LineItemRequest =
            serde_json::from_value(serde_json::json!({ "product_id": 7, "quantity": 0 })).unwrap();
        assert!(req.price(&product()).is_err());
    }

    #[test]
    fn oversized_price_is_a_validation_error() {
        let req: LineItemRequest = serde_json::from_value(serde_json::json!({
            "product_id": 7,
            "quantity": 2,
            "unit_price": "79228162514264337593543950335"
        }))
        .unwrap();
        assert!(req.price(&product()).is_err());
    }

    #[test]
    fn item_requests_serialize_for_validation_params() {
        let req: LineItemRequest =
            serde_json::from_value(serde_json::json!({ "product_id": 7 })).unwrap();
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["product_id"], 7);
        assert_eq!(value["quantity"], 1);
    }
}
