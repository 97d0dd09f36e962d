//! Human-readable document numbers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const QUOTATION_PREFIX: &str = "QT";
pub const INVOICE_PREFIX: &str = "INV";

/// `PREFIX-YYYYMMDD-XXXXXXXX`, where the suffix is the first 8 hex digits of
/// a random UUID, upper-cased.
pub fn document_number(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    format!(
        "{}-{}-{}",
        prefix,
        now.format("%Y%m%d"),
        suffix.to_uppercase()
    )
}

pub fn quotation_number() -> String {
    document_number(QUOTATION_PREFIX, Utc::now())
}

pub fn invoice_number() -> String {
    document_number(INVOICE_PREFIX, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn number_has_prefix_date_and_hex_suffix() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 0).unwrap();
        let number = document_number(INVOICE_PREFIX, now);
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1], "20240307");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn numbers_are_distinct() {
        assert_ne!(quotation_number(), quotation_number());
    }
}
