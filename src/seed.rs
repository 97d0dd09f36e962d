//! Demo fixture loader
//!
//! Inserts one demo tenant with explicit primary keys, but only into a
//! database without companies: the fixtures reference each other by id and
//! must never attach to a real tenant. Every insert is also
//! `ON CONFLICT DO NOTHING`. Afterwards each id sequence is moved to the
//! table's highest id so later inserts do not collide with the fixtures.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use crate::auth::password;
use crate::domain::plans::Plan;
use crate::domain::pricing::{DocumentTotals, LineAmounts, LineInput};

/// Seeded tables in insertion order.
pub const SEEDED_TABLES: [&str; 12] = [
    "companies",
    "users",
    "products",
    "leads",
    "customers",
    "quotations",
    "quotation_items",
    "invoices",
    "invoice_items",
    "tasks",
    "activities",
    "subscriptions",
];

const COMPANY_ID: i64 = 1;
const DEMO_SUBDOMAIN: &str = "demo";

/// What the loader does given the existing companies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeedPlan {
    Load,
    AlreadyLoaded,
    ForeignTenants,
}

/// `fixture_owner` is the subdomain of the company holding the fixture id.
fn seed_plan(company_count: i64, fixture_owner: Option<&str>) -> SeedPlan {
    match (company_count, fixture_owner) {
        (0, _) => SeedPlan::Load,
        (1, Some(DEMO_SUBDOMAIN)) => SeedPlan::AlreadyLoaded,
        _ => SeedPlan::ForeignTenants,
    }
}

#[derive(Debug, Default)]
pub struct SeedReport {
    /// Rows inserted per table, in `SEEDED_TABLES` order.
    pub inserted: Vec<(&'static str, u64)>,
}

impl SeedReport {
    fn add(&mut self, table: &'static str, rows: u64) {
        match self.inserted.iter_mut().find(|(t, _)| *t == table) {
            Some((_, count)) => *count += rows,
            None => self.inserted.push((table, rows)),
        }
    }

    pub fn total_inserted(&self) -> u64 {
        self.inserted.iter().map(|(_, n)| n).sum()
    }
}

struct SeedUser {
    id: i64,
    email: &'static str,
    username: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    role: &'static str,
    password: &'static str,
}

const USERS: [SeedUser; 3] = [
    SeedUser {
        id: 1,
        email: "admin@democompany.com",
        username: "admin",
        first_name: "Admin",
        last_name: "User",
        role: "admin",
        password: "admin123",
    },
    SeedUser {
        id: 2,
        email: "manager@democompany.com",
        username: "manager",
        first_name: "Maria",
        last_name: "Lopez",
        role: "manager",
        password: "manager123",
    },
    SeedUser {
        id: 3,
        email: "sales@democompany.com",
        username: "sales",
        first_name: "Sam",
        last_name: "Patel",
        role: "sales_executive",
        password: "sales1234",
    },
];

struct SeedProduct {
    id: i64,
    name: &'static str,
    sku: &'static str,
    category: &'static str,
    unit_price: Decimal,
    cost_price: Decimal,
    tax_rate: Decimal,
}

fn products() -> [SeedProduct; 3] {
    [
        SeedProduct {
            id: 1,
            name: "CRM Onboarding",
            sku: "DEMO-ONB-001",
            category: "Services",
            unit_price: Decimal::new(50000, 2),
            cost_price: Decimal::new(20000, 2),
            tax_rate: Decimal::from(18),
        },
        SeedProduct {
            id: 2,
            name: "Support Plan (monthly)",
            sku: "DEMO-SUP-001",
            category: "Subscriptions",
            unit_price: Decimal::new(9900, 2),
            cost_price: Decimal::new(3000, 2),
            tax_rate: Decimal::from(18),
        },
        SeedProduct {
            id: 3,
            name: "Training Session",
            sku: "DEMO-TRN-001",
            category: "Services",
            unit_price: Decimal::new(25000, 2),
            cost_price: Decimal::new(8000, 2),
            tax_rate: Decimal::from(5),
        },
    ]
}

struct SeedLine {
    id: i64,
    product_id: i64,
    description: &'static str,
    input: LineInput,
}

impl SeedLine {
    fn amounts(&self) -> Result<LineAmounts> {
        self.input.amounts().map_err(anyhow::Error::msg)
    }
}

fn line(id: i64, product: &SeedProduct, quantity: i32, discount_percent: Decimal) -> SeedLine {
    SeedLine {
        id,
        product_id: product.id,
        description: product.name,
        input: LineInput {
            quantity,
            unit_price: product.unit_price,
            discount_percent,
            tax_rate: product.tax_rate,
        },
    }
}

fn document_totals(lines: &[SeedLine]) -> Result<DocumentTotals> {
    let amounts = lines
        .iter()
        .map(SeedLine::amounts)
        .collect::<Result<Vec<_>>>()?;
    DocumentTotals::from_lines(&amounts).map_err(anyhow::Error::msg)
}

/// Load the demo fixtures.
pub async fn run(pool: &PgPool) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let mut tx = pool.begin().await.context("Failed to start seed transaction")?;

    // Registrations wait for the seed to finish instead of racing the check.
    sqlx::query("LOCK TABLE companies IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await
        .context("Failed to lock companies for seeding")?;

    let company_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM companies")
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count companies")?;
    let fixture_owner: Option<String> =
        sqlx::query_scalar("SELECT subdomain FROM companies WHERE id = $1")
            .bind(COMPANY_ID)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to look up the demo company")?;

    match seed_plan(company_count, fixture_owner.as_deref()) {
        SeedPlan::Load => {}
        SeedPlan::AlreadyLoaded => {
            tracing::info!("Demo data already present");
            return Ok(report);
        }
        SeedPlan::ForeignTenants => {
            tracing::warn!(company_count, "Database already holds tenants, demo data not loaded");
            return Ok(report);
        }
    }

    seed_company(&mut tx, &mut report).await?;
    seed_users(&mut tx, &mut report).await?;
    let products = products();
    seed_products(&mut tx, &products, &mut report).await?;
    seed_leads_and_customers(&mut tx, &mut report).await?;
    seed_documents(&mut tx, &products, &mut report).await?;
    seed_work(&mut tx, &mut report).await?;

    for table in SEEDED_TABLES {
        reset_sequence(&mut tx, table).await?;
    }

    tx.commit().await.context("Failed to commit seed data")?;

    for (table, rows) in &report.inserted {
        tracing::debug!(table, rows, "Seeded table");
    }
    Ok(report)
}

async fn seed_company(conn: &mut PgConnection, report: &mut SeedReport) -> Result<()> {
    let limits = Plan::Pro.limits();
    let rows = sqlx::query(
        r#"
        INSERT INTO companies
            (id, name, subdomain, domain, address, city, state, zip_code, country, industry,
             size, phone, email, website, subscription_plan, max_users, max_storage_gb)
        VALUES ($1, 'Demo Company', 'demo', 'demo.example.com', '123 Demo Street', 'Demo City',
                'Demo State', '12345', 'US', 'Technology', '1-10', '+1-555-123-4567',
                'admin@democompany.com', 'https://democompany.com', $2, $3, $4)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(COMPANY_ID)
    .bind(Plan::Pro.as_str())
    .bind(limits.max_users)
    .bind(limits.max_storage_gb)
    .execute(&mut *conn)
    .await
    .context("Failed to seed company")?
    .rows_affected();
    report.add("companies", rows);
    Ok(())
}

async fn seed_users(conn: &mut PgConnection, report: &mut SeedReport) -> Result<()> {
    for user in &USERS {
        let hash = password::hash_password(user.password)
            .map_err(|e| anyhow::anyhow!("Failed to hash seed password: {}", e))?;
        let rows = sqlx::query(
            r#"
            INSERT INTO users
                (id, company_id, email, username, first_name, last_name, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(COMPANY_ID)
        .bind(user.email)
        .bind(user.username)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(&hash)
        .bind(user.role)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to seed user {}", user.username))?
        .rows_affected();
        report.add("users", rows);
    }
    Ok(())
}

async fn seed_products(
    conn: &mut PgConnection,
    products: &[SeedProduct],
    report: &mut SeedReport,
) -> Result<()> {
    for product in products {
        let rows = sqlx::query(
            r#"
            INSERT INTO products
                (id, company_id, name, sku, category, unit_price, cost_price, tax_rate)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(product.id)
        .bind(COMPANY_ID)
        .bind(product.name)
        .bind(product.sku)
        .bind(product.category)
        .bind(product.unit_price)
        .bind(product.cost_price)
        .bind(product.tax_rate)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to seed product {}", product.sku))?
        .rows_affected();
        report.add("products", rows);
    }
    Ok(())
}

async fn seed_leads_and_customers(conn: &mut PgConnection, report: &mut SeedReport) -> Result<()> {
    // (id, assignee, first, last, email, company, source, status, value)
    let leads: [(i64, i64, &str, &str, &str, &str, &str, &str, Decimal); 3] = [
        (
            1,
            3,
            "Olivia",
            "Chen",
            "olivia.chen@example.com",
            "Northwind Traders",
            "website",
            "closed_won",
            Decimal::new(1200000, 2),
        ),
        (
            2,
            3,
            "Ravi",
            "Kumar",
            "ravi.kumar@example.com",
            "Contoso Ltd",
            "referral",
            "qualified",
            Decimal::new(800000, 2),
        ),
        (
            3,
            2,
            "Emma",
            "Novak",
            "emma.novak@example.com",
            "Fabrikam Inc",
            "email_campaign",
            "prospect",
            Decimal::new(350000, 2),
        ),
    ];
    for (id, assignee, first, last, email, company, source, status, value) in leads {
        let rows = sqlx::query(
            r#"
            INSERT INTO leads
                (id, company_id, assigned_to_id, first_name, last_name, email, company_name,
                 source, status, estimated_value)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(COMPANY_ID)
        .bind(assignee)
        .bind(first)
        .bind(last)
        .bind(email)
        .bind(company)
        .bind(source)
        .bind(status)
        .bind(value)
        .execute(&mut *conn)
        .await
        .context("Failed to seed lead")?
        .rows_affected();
        report.add("leads", rows);
    }

    // Customer 1 came from the won lead.
    let customers: [(i64, Option<i64>, &str, &str, &str, &str); 2] = [
        (1, Some(1), "Olivia", "Chen", "olivia.chen@example.com", "Northwind Traders"),
        (2, None, "Liam", "Walsh", "liam.walsh@example.com", "Adventure Works"),
    ];
    for (id, lead_id, first, last, email, company) in customers {
        let rows = sqlx::query(
            r#"
            INSERT INTO customers
                (id, company_id, lead_id, first_name, last_name, email, company_name,
                 payment_terms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'Net 30')
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(COMPANY_ID)
        .bind(lead_id)
        .bind(first)
        .bind(last)
        .bind(email)
        .bind(company)
        .execute(&mut *conn)
        .await
        .context("Failed to seed customer")?
        .rows_affected();
        report.add("customers", rows);
    }
    Ok(())
}

async fn insert_lines(
    conn: &mut PgConnection,
    table: &'static str,
    parent_column: &str,
    parent_id: i64,
    lines: &[SeedLine],
    report: &mut SeedReport,
) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO {} (id, {}, product_id, description, quantity, unit_price,
                        discount_percent, tax_rate, total_amount)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT DO NOTHING
        "#,
        table, parent_column
    );
    for line in lines {
        let total = line.amounts()?.total;
        let rows = sqlx::query(&sql)
            .bind(line.id)
            .bind(parent_id)
            .bind(line.product_id)
            .bind(line.description)
            .bind(line.input.quantity)
            .bind(line.input.unit_price)
            .bind(line.input.discount_percent)
            .bind(line.input.tax_rate)
            .bind(total)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to seed {}", table))?
            .rows_affected();
        report.add(table, rows);
    }
    Ok(())
}

async fn seed_documents(
    conn: &mut PgConnection,
    products: &[SeedProduct; 3],
    report: &mut SeedReport,
) -> Result<()> {
    let quotation_lines = [
        line(1, &products[0], 1, Decimal::ZERO),
        line(2, &products[2], 2, Decimal::from(10)),
    ];
    let totals = document_totals(&quotation_lines)?;
    let rows = sqlx::query(
        r#"
        INSERT INTO quotations
            (id, company_id, customer_id, quotation_number, subject, valid_until, subtotal,
             tax_amount, total_amount, status)
        VALUES (1, $1, 2, 'QT-DEMO-0001', 'Onboarding and training',
                NOW() + INTERVAL '30 days', $2, $3, $4, 'sent')
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(COMPANY_ID)
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.total_amount)
    .execute(&mut *conn)
    .await
    .context("Failed to seed quotation")?
    .rows_affected();
    report.add("quotations", rows);
    insert_lines(conn, "quotation_items", "quotation_id", 1, &quotation_lines, report).await?;

    let invoice_lines = [
        line(1, &products[0], 1, Decimal::ZERO),
        line(2, &products[1], 3, Decimal::ZERO),
    ];
    let totals = document_totals(&invoice_lines)?;
    let rows = sqlx::query(
        r#"
        INSERT INTO invoices
            (id, company_id, customer_id, invoice_number, subject, due_date, subtotal,
             tax_amount, total_amount, status, payment_date)
        VALUES (1, $1, 1, 'INV-DEMO-0001', 'Onboarding and first quarter support',
                NOW() - INTERVAL '5 days', $2, $3, $4, 'paid', NOW() - INTERVAL '7 days')
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(COMPANY_ID)
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.total_amount)
    .execute(&mut *conn)
    .await
    .context("Failed to seed invoice")?
    .rows_affected();
    report.add("invoices", rows);
    insert_lines(conn, "invoice_items", "invoice_id", 1, &invoice_lines, report).await
}

async fn seed_work(conn: &mut PgConnection, report: &mut SeedReport) -> Result<()> {
    let tasks: [(i64, i64, &str, &str, &str); 2] = [
        (1, 3, "Send proposal to Contoso", "high", "pending"),
        (2, 2, "Schedule Fabrikam discovery call", "medium", "in_progress"),
    ];
    for (id, assignee, title, priority, status) in tasks {
        let rows = sqlx::query(
            r#"
            INSERT INTO tasks (id, company_id, assigned_to_id, title, priority, status, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, NOW() + make_interval(days => $1::int * 2))
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(COMPANY_ID)
        .bind(assignee)
        .bind(title)
        .bind(priority)
        .bind(status)
        .execute(&mut *conn)
        .await
        .context("Failed to seed task")?
        .rows_affected();
        report.add("tasks", rows);
    }

    let activities: [(i64, i64, i64, &str, &str); 2] = [
        (1, 3, 1, "call", "Closing call with Olivia"),
        (2, 3, 2, "email", "Sent pricing overview"),
    ];
    for (id, user_id, lead_id, kind, subject) in activities {
        let rows = sqlx::query(
            r#"
            INSERT INTO activities
                (id, company_id, user_id, lead_id, activity_type, subject, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(COMPANY_ID)
        .bind(user_id)
        .bind(lead_id)
        .bind(kind)
        .bind(subject)
        .execute(&mut *conn)
        .await
        .context("Failed to seed activity")?
        .rows_affected();
        report.add("activities", rows);
    }

    let rows = sqlx::query(
        r#"
        INSERT INTO subscriptions
            (id, company_id, plan, status, current_period_start, current_period_end)
        VALUES (1, $1, $2, 'active', NOW(), NOW() + INTERVAL '30 days')
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(COMPANY_ID)
    .bind(Plan::Pro.as_str())
    .execute(&mut *conn)
    .await
    .context("Failed to seed subscription")?
    .rows_affected();
    report.add("subscriptions", rows);
    Ok(())
}

/// `setval` to `MAX(id)`, or back to 1 (uncalled) for an empty table.
async fn reset_sequence(conn: &mut PgConnection, table: &str) -> Result<()> {
    sqlx::query(&format!(
        r#"
        SELECT setval(pg_get_serial_sequence('{table}', 'id'),
                      COALESCE(MAX(id), 1), MAX(id) IS NOT NULL)
        FROM {table}
        "#,
        table = table
    ))
    .execute(conn)
    .await
    .with_context(|| format!("Failed to reset id sequence for {}", table))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn report_totals_across_tables() {
        let mut report = SeedReport::default();
        report.add("users", 3);
        report.add("products", 0);
        report.add("users", 1);
        assert_eq!(report.total_inserted(), 4);
        assert_eq!(report.inserted[0], ("users", 4));
    }

    #[test]
    fn fixture_lines_use_api_arithmetic() {
        let products = products();
        let lines = [
            line(1, &products[0], 1, Decimal::ZERO),
            line(2, &products[2], 2, Decimal::from(10)),
        ];
        // 500.00 + 18% and 2 x 250.00 less 10% + 5%
        let totals = document_totals(&lines).unwrap();
        assert_eq!(totals.subtotal, Decimal::from_str("950.00").unwrap());
        assert_eq!(totals.tax_amount, Decimal::from_str("112.50").unwrap());
        assert_eq!(totals.total_amount, Decimal::from_str("1062.50").unwrap());
    }

    #[test]
    fn parents_are_seeded_before_children() {
        let pos = |t: &str| SEEDED_TABLES.iter().position(|x| *x == t).unwrap();
        assert!(pos("companies") < pos("users"));
        assert!(pos("leads") < pos("customers"));
        assert!(pos("quotations") < pos("quotation_items"));
        assert!(pos("invoices") < pos("invoice_items"));
    }

    #[test]
    fn seed_passwords_meet_minimum_length() {
        assert!(USERS.iter().all(|u| u.password.len() >= 8));
    }

    #[test]
    fn only_an_empty_database_is_seeded() {
        assert_eq!(seed_plan(0, None), SeedPlan::Load);
        assert_eq!(seed_plan(1, Some("demo")), SeedPlan::AlreadyLoaded);
        assert_eq!(seed_plan(1, Some("acme")), SeedPlan::ForeignTenants);
        assert_eq!(seed_plan(2, Some("demo")), SeedPlan::ForeignTenants);
        assert_eq!(seed_plan(1, None), SeedPlan::ForeignTenants);
    }

    async fn sequence_matches_max_id(pool: &PgPool, table: &str) -> bool {
        let sequence: String = sqlx::query_scalar("SELECT pg_get_serial_sequence($1, 'id')")
            .bind(table)
            .fetch_one(pool)
            .await
            .unwrap();
        let last_value: i64 = sqlx::query_scalar(&format!("SELECT last_value FROM {}", sequence))
            .fetch_one(pool)
            .await
            .unwrap();
        let max_id: Option<i64> = sqlx::query_scalar(&format!("SELECT MAX(id) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap();
        max_id == Some(last_value)
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn rerun_inserts_nothing_and_sequences_follow_fixtures(pool: PgPool) {
        let first = run(&pool).await.unwrap();
        assert!(first.total_inserted() > 0);

        let second = run(&pool).await.unwrap();
        assert_eq!(second.total_inserted(), 0);

        for table in SEEDED_TABLES {
            assert!(sequence_matches_max_id(&pool, table).await, "{}", table);
        }
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn existing_tenant_gets_no_demo_rows(pool: PgPool) {
        sqlx::query("INSERT INTO companies (name, subdomain) VALUES ('Acme', 'acme')")
            .execute(&pool)
            .await
            .unwrap();

        let report = run(&pool).await.unwrap();
        assert_eq!(report.total_inserted(), 0);

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        let leads: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((users, leads), (0, 0));
    }
}
