//! Line item and document total arithmetic for quotations and invoices.

use rust_decimal::{Decimal, RoundingStrategy};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Largest value a `NUMERIC(12, 2)` money column holds.
/// 999_999_999_999 hundredths, split into the low and middle 32-bit words.
pub const MAX_MONEY: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

pub const MAX_QUANTITY: i32 = 1_000_000;

const AMOUNT_TOO_LARGE: &str = "Amount exceeds the maximum of 9999999999.99";

/// Inputs for one priced line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInput {
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub tax_rate: Decimal,
}

/// Rounded amounts of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub net: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Header totals stored on a quotation or invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn is_percentage(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= HUNDRED
}

impl LineInput {
    /// Rejects quantities outside 1..=MAX_QUANTITY, prices outside
    /// 0..=MAX_MONEY and percentages outside 0..=100.
    pub fn validate(&self) -> Result<(), String> {
        if self.quantity < 1 {
            return Err("Quantity must be at least 1".to_string());
        }
        if self.quantity > MAX_QUANTITY {
            return Err(format!("Quantity cannot exceed {}", MAX_QUANTITY));
        }
        if self.unit_price < Decimal::ZERO {
            return Err("Unit price cannot be negative".to_string());
        }
        if self.unit_price > MAX_MONEY {
            return Err(AMOUNT_TOO_LARGE.to_string());
        }
        if !is_percentage(self.discount_percent) {
            return Err("Discount must be between 0 and 100".to_string());
        }
        if !is_percentage(self.tax_rate) {
            return Err("Tax rate must be between 0 and 100".to_string());
        }
        Ok(())
    }

    /// Fails when the line total does not fit a money column.
    pub fn amounts(&self) -> Result<LineAmounts, String> {
        let too_large = || AMOUNT_TOO_LARGE.to_string();
        let gross = Decimal::from(self.quantity)
            .checked_mul(self.unit_price)
            .ok_or_else(too_large)?;
        let discount = gross
            .checked_mul(self.discount_percent)
            .ok_or_else(too_large)?
            / HUNDRED;
        let net = round_money(gross - discount);
        let tax = round_money(net.checked_mul(self.tax_rate).ok_or_else(too_large)? / HUNDRED);
        let total = within_money(net.checked_add(tax).ok_or_else(too_large)?)?;
        Ok(LineAmounts { net, tax, total })
    }
}

fn within_money(value: Decimal) -> Result<Decimal, String> {
    if value > MAX_MONEY {
        return Err(AMOUNT_TOO_LARGE.to_string());
    }
    Ok(value)
}

impl DocumentTotals {
    /// Fails when the document total does not fit a money column.
    pub fn from_lines<'a>(
        lines: impl IntoIterator<Item = &'a LineAmounts>,
    ) -> Result<Self, String> {
        let mut subtotal = Decimal::ZERO;
        let mut tax_amount = Decimal::ZERO;
        for line in lines {
            subtotal = within_money(subtotal.checked_add(line.net).ok_or(AMOUNT_TOO_LARGE)?)?;
            tax_amount = within_money(tax_amount.checked_add(line.tax).ok_or(AMOUNT_TOO_LARGE)?)?;
        }
        Ok(Self {
            subtotal,
            tax_amount,
            total_amount: within_money(subtotal + tax_amount)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(quantity: i32, price: Decimal, discount: Decimal, tax: Decimal) -> LineInput {
        LineInput {
            quantity,
            unit_price: price,
            discount_percent: discount,
            tax_rate: tax,
        }
    }

    #[test]
    fn applies_discount_before_tax() {
        let amounts = line(2, d("100.00"), d("10"), d("8")).amounts().unwrap();
        assert_eq!(amounts.net, d("180.00"));
        assert_eq!(amounts.tax, d("14.40"));
        assert_eq!(amounts.total, d("194.40"));
    }

    #[test]
    fn rounds_each_line_half_away_from_zero() {
        // 3 * 0.335 = 1.005 -> 1.01
        let amounts = line(3, d("0.335"), d("0"), d("0")).amounts().unwrap();
        assert_eq!(amounts.net, d("1.01"));
        // 10.05 * 5% = 0.5025 -> 0.50
        let amounts = line(1, d("10.05"), d("0"), d("5")).amounts().unwrap();
        assert_eq!(amounts.tax, d("0.50"));
    }

    #[test]
    fn document_totals_sum_rounded_lines() {
        let lines = [
            line(1, d("1299.99"), d("0"), d("8")).amounts().unwrap(),
            line(5, d("49.99"), d("10"), d("8")).amounts().unwrap(),
        ];
        let totals = DocumentTotals::from_lines(&lines).unwrap();
        assert_eq!(totals.subtotal, d("1524.95"));
        assert_eq!(totals.tax_amount, d("122.00"));
        assert_eq!(totals.total_amount, d("1646.95"));
    }

    #[test]
    fn empty_document_is_zero() {
        let totals = DocumentTotals::from_lines(&[]).unwrap();
        assert_eq!(totals, DocumentTotals::default());
    }

    #[test]
    fn validation_rejects_out_of_range_inputs() {
        assert!(line(0, d("1"), d("0"), d("0")).validate().is_err());
        assert!(line(1, d("-1"), d("0"), d("0")).validate().is_err());
        assert!(line(1, d("1"), d("100.01"), d("0")).validate().is_err());
        assert!(line(1, d("1"), d("0"), d("-0.5")).validate().is_err());
        assert!(line(1, d("1"), d("100"), d("100")).validate().is_ok());
    }

    #[test]
    fn rejects_amounts_beyond_money_columns() {
        let huge = Decimal::MAX;
        assert!(line(2, huge, d("0"), d("0")).validate().is_err());
        assert!(line(2, huge, d("0"), d("0")).amounts().is_err());
        assert!(line(MAX_QUANTITY + 1, d("1"), d("0"), d("0")).validate().is_err());

        let at_cap = line(1, MAX_MONEY, d("0"), d("0"));
        assert!(at_cap.validate().is_ok());
        assert_eq!(at_cap.amounts().unwrap().total, d("9999999999.99"));

        // Valid on its own, but the total overflows the column.
        let over = line(MAX_QUANTITY, MAX_MONEY, d("0"), d("0"));
        assert!(over.validate().is_ok());
        assert!(over.amounts().is_err());
    }

    #[test]
    fn document_total_is_capped() {
        let full = line(1, MAX_MONEY, d("0"), d("0")).amounts().unwrap();
        assert!(DocumentTotals::from_lines(&[full, full]).is_err());
    }
}
