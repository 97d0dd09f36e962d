//! Company (tenant) types and subdomain rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

const MAX_DERIVED_SUBDOMAIN_LEN: usize = 20;
const FALLBACK_SUBDOMAIN: &str = "company";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub subdomain: String,
    pub domain: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub subscription_plan: String,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub max_users: i32,
    pub max_storage_gb: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const COMPANY_COLUMNS: &str = "id, name, subdomain, domain, address, city, state, zip_code, \
     country, industry, size, phone, email, website, logo_url, subscription_plan, \
     subscription_start_date, subscription_end_date, max_users, max_storage_gb, is_active, \
     created_at, updated_at";

/// Self-service signup: a new company plus its first admin.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterCompanyRequest {
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub company_name: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub company_website: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub company_phone: Option<String>,
    #[serde(default)]
    pub company_size: Option<String>,
    #[serde(default)]
    pub company_address: Option<String>,
    #[serde(default)]
    pub company_city: Option<String>,
    #[serde(default)]
    pub company_state: Option<String>,
    #[serde(default)]
    pub company_zip: Option<String>,
    #[serde(default)]
    pub company_country: Option<String>,
    #[serde(default)]
    pub company_industry: Option<String>,

    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub last_name: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub subdomain: Option<String>,
    #[validate(length(max = 100))]
    pub domain: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(max = 20))]
    pub zip_code: Option<String>,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    #[validate(length(max = 100))]
    pub industry: Option<String>,
    #[validate(length(max = 50))]
    pub size: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 200))]
    pub website: Option<String>,
    #[validate(length(max = 500))]
    pub logo_url: Option<String>,
}

/// Lower-cased alphanumerics of the company name, at most 20 chars.
pub fn derive_subdomain(company_name: &str) -> String {
    let base: String = company_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_DERIVED_SUBDOMAIN_LEN)
        .collect();
    if base.is_empty() {
        FALLBACK_SUBDOMAIN.to_string()
    } else {
        base
    }
}

/// `base`, then `base1`, `base2`, ... for the n-th retry.
pub fn numbered_candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{}{}", base, attempt)
    }
}

/// Subdomains set by hand must be 1-50 lower-case alphanumerics.
pub fn is_valid_subdomain(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 50
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_strips_and_truncates() {
        assert_eq!(derive_subdomain("Acme Corp, Inc."), "acmecorpinc");
        assert_eq!(
            derive_subdomain("The Very Long Company Name Limited"),
            "theverylongcompanyna"
        );
        assert_eq!(derive_subdomain("!!!"), "company");
        assert_eq!(derive_subdomain("Société Générale"), "socitgnrale");
    }

    #[test]
    fn candidates_append_counter() {
        assert_eq!(numbered_candidate("acme", 0), "acme");
        assert_eq!(numbered_candidate("acme", 1), "acme1");
        assert_eq!(numbered_candidate("acme", 12), "acme12");
    }

    #[test]
    fn manual_subdomain_format() {
        assert!(is_valid_subdomain("acme2024"));
        assert!(!is_valid_subdomain("Acme"));
        assert!(!is_valid_subdomain("acme-corp"));
        assert!(!is_valid_subdomain(""));
        assert!(!is_valid_subdomain(&"a".repeat(51)));
    }
}
