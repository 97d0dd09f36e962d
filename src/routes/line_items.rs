//! Line item persistence shared by quotations and invoices.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};
use std::collections::HashMap;

use crate::domain::line_items::{self, LineItem, LineItemRequest, PricedLine, ProductPricing};
use crate::domain::pricing::DocumentTotals;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Quotation,
    Invoice,
}

impl DocumentKind {
    fn items_table(&self) -> &'static str {
        match self {
            Self::Quotation => "quotation_items",
            Self::Invoice => "invoice_items",
        }
    }

    fn parent_column(&self) -> &'static str {
        match self {
            Self::Quotation => "quotation_id",
            Self::Invoice => "invoice_id",
        }
    }
}

/// Resolves every requested product inside the tenant and prices the lines.
pub async fn price_items(
    conn: &mut PgConnection,
    company_id: i64,
    items: &[LineItemRequest],
) -> ApiResult<(Vec<PricedLine>, DocumentTotals)> {
    let ids: Vec<i64> = items.iter().map(|i| i.product_id).collect();

    let products: HashMap<i64, ProductPricing> = sqlx::query_as::<_, ProductPricing>(
        "SELECT id, name, unit_price, tax_rate FROM products \
         WHERE company_id = $1 AND id = ANY($2)",
    )
    .bind(company_id)
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|p| (p.id, p))
    .collect();

    let lines = items
        .iter()
        .map(|item| {
            let product = products.get(&item.product_id).ok_or_else(|| {
                ApiError::bad_request(format!("Product {} not found", item.product_id))
            })?;
            item.price(product).map_err(ApiError::BadRequest)
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let totals = line_items::totals(&lines).map_err(ApiError::BadRequest)?;
    Ok((lines, totals))
}

pub async fn insert_items(
    conn: &mut PgConnection,
    kind: DocumentKind,
    document_id: i64,
    lines: &[PricedLine],
) -> ApiResult<()> {
    let sql = format!(
        r#"
        INSERT INTO {} ({}, product_id, description, quantity, unit_price, discount_percent,
                        tax_rate, total_amount)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
        kind.items_table(),
        kind.parent_column()
    );

    for line in lines {
        sqlx::query(&sql)
            .bind(document_id)
            .bind(line.product_id)
            .bind(&line.description)
            .bind(line.input.quantity)
            .bind(line.input.unit_price)
            .bind(line.input.discount_percent)
            .bind(line.input.tax_rate)
            .bind(line.amounts.total)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn delete_items(
    conn: &mut PgConnection,
    kind: DocumentKind,
    document_id: i64,
) -> ApiResult<()> {
    sqlx::query(&format!(
        "DELETE FROM {} WHERE {} = $1",
        kind.items_table(),
        kind.parent_column()
    ))
    .bind(document_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Copies every line of one document onto another, keeping stored prices.
pub async fn copy_items(
    conn: &mut PgConnection,
    from: DocumentKind,
    from_id: i64,
    to: DocumentKind,
    to_id: i64,
) -> ApiResult<u64> {
    let copied = sqlx::query(&format!(
        r#"
        INSERT INTO {to_table} ({to_parent}, product_id, description, quantity, unit_price,
                                discount_percent, tax_rate, total_amount)
        SELECT $1, product_id, description, quantity, unit_price, discount_percent, tax_rate,
               total_amount
        FROM {from_table} WHERE {from_parent} = $2
        ORDER BY id
        "#,
        to_table = to.items_table(),
        to_parent = to.parent_column(),
        from_table = from.items_table(),
        from_parent = from.parent_column(),
    ))
    .bind(to_id)
    .bind(from_id)
    .execute(conn)
    .await?;
    Ok(copied.rows_affected())
}

pub async fn load_items<'e>(
    executor: impl PgExecutor<'e>,
    kind: DocumentKind,
    document_id: i64,
) -> ApiResult<Vec<LineItem>> {
    let items = sqlx::query_as::<_, LineItem>(&format!(
        r#"
        SELECT li.id, li.product_id, p.name AS product_name, li.description, li.quantity,
               li.unit_price, li.discount_percent, li.tax_rate, li.total_amount
        FROM {} li
        LEFT JOIN products p ON p.id = li.product_id
        WHERE li.{} = $1
        ORDER BY li.id
        "#,
        kind.items_table(),
        kind.parent_column()
    ))
    .bind(document_id)
    .fetch_all(executor)
    .await?;
    Ok(items)
}

/// Plain-text body for the "send document" emails.
pub fn summary_email(
    label: &str,
    number: &str,
    subject: Option<&str>,
    total: Decimal,
    message: Option<&str>,
) -> String {
    let mut body = format!("{} {}\n", label, number);
    if let Some(subject) = subject.filter(|s| !s.is_empty()) {
        body.push_str(&format!("Subject: {}\n", subject));
    }
    body.push_str(&format!("Total: {}\n", total));
    if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
        body.push('\n');
        body.push_str(message.trim());
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_email_skips_empty_parts() {
        let body = summary_email("Invoice", "INV-1", None, Decimal::new(1050, 2), Some("  "));
        assert_eq!(body, "Invoice INV-1\nTotal: 10.50\n");

        let body =
            summary_email("Quotation", "QT-1", Some("Rollout"), Decimal::ONE, Some("Thanks"));
        assert!(body.contains("Subject: Rollout"));
        assert!(body.ends_with("\nThanks\n"));
    }

    #[test]
    fn kinds_map_to_their_tables() {
        assert_eq!(DocumentKind::Quotation.items_table(), "quotation_items");
        assert_eq!(DocumentKind::Quotation.parent_column(), "quotation_id");
        assert_eq!(DocumentKind::Invoice.items_table(), "invoice_items");
        assert_eq!(DocumentKind::Invoice.parent_column(), "invoice_id");
    }
}
