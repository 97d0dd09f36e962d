//! Helpers shared by the route modules.

use sqlx::{PgExecutor, PgPool};

use crate::auth::password;
use crate::domain::plans;
use crate::error::ApiError;

/// `%term%` for ILIKE filters; blank input means no filter.
pub fn like_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")))
}

/// Empty strings in optional filters count as absent.
pub fn filter_value(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    password::hash_password(plain)
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {}", e)))
}

/// 400 "Invalid user" unless `user_id` is a user of the company.
pub async fn ensure_company_user(
    db: &PgPool,
    company_id: i64,
    user_id: i64,
) -> Result<(), ApiError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND company_id = $2)",
    )
    .bind(user_id)
    .bind(company_id)
    .fetch_one(db)
    .await?;

    if exists {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid user"))
    }
}

/// 400 "Invalid customer" unless the customer belongs to the company.
pub async fn ensure_company_customer<'e>(
    executor: impl PgExecutor<'e>,
    company_id: i64,
    customer_id: i64,
) -> Result<(), ApiError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM customers WHERE id = $1 AND company_id = $2)",
    )
    .bind(customer_id)
    .bind(company_id)
    .fetch_one(executor)
    .await?;

    if exists {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid customer"))
    }
}

/// Active users of the company.
pub async fn active_user_count(db: &PgPool, company_id: i64) -> Result<i64, ApiError> {
    Ok(sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE company_id = $1 AND is_active = TRUE",
    )
    .bind(company_id)
    .fetch_one(db)
    .await?)
}

/// 403 once the company's plan has no seat left.
pub async fn ensure_user_capacity(db: &PgPool, company_id: i64) -> Result<(), ApiError> {
    let max_users: i32 = sqlx::query_scalar("SELECT max_users FROM companies WHERE id = $1")
        .bind(company_id)
        .fetch_one(db)
        .await?;
    let current = active_user_count(db, company_id).await?;

    if plans::user_limit_reached(current, max_users) {
        return Err(ApiError::forbidden(format!(
            "User limit reached ({} users). Upgrade your plan to add more users.",
            max_users
        )));
    }
    Ok(())
}

/// First free username: `base`, `base1`, `base2`, ...
pub async fn unique_username(db: &PgPool, base: &str) -> Result<String, ApiError> {
    let mut attempt = 0u32;
    loop {
        let candidate = crate::domain::companies::numbered_candidate(base, attempt);
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(&candidate)
                .fetch_one(db)
                .await?;
        if !taken {
            return Ok(candidate);
        }
        attempt += 1;
    }
}

pub async fn email_taken(db: &PgPool, email: &str) -> Result<bool, ApiError> {
    Ok(
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
            .bind(email)
            .fetch_one(db)
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(Some(" acme ")).as_deref(), Some("%acme%"));
        assert_eq!(like_pattern(Some("50%_off")).as_deref(), Some("%50\\%\\_off%"));
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(None), None);
    }

    #[test]
    fn blank_filters_are_ignored() {
        assert_eq!(filter_value(Some("")), None);
        assert_eq!(filter_value(Some(" sent ")), Some("sent"));
    }
}
