//! User, role and session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::companies::Company;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    SalesExecutive,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::SalesExecutive
    }
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::SalesExecutive => "sales_executive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "sales_executive" => Some(Self::SalesExecutive),
            _ => None,
        }
    }

    /// Admins and managers share the same management rights.
    pub fn is_manager(&self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

/// User row without credentials.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub company_id: i64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const USER_COLUMNS: &str = "id, company_id, email, username, first_name, last_name, role, \
     phone, avatar_url, is_active, last_login, created_at, updated_at";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<Company>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

/// Join an existing company as a sales executive.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterUserRequest {
    /// Tenant subdomain; falls back to the one in the Host header.
    #[serde(default)]
    pub subdomain: Option<String>,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 3, max = 80))]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub last_name: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InviteUserRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 3, max = 80))]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub last_name: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteUserResponse {
    pub user: User,
    pub email_sent: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default, FromRow)]
pub struct UserStats {
    pub leads_assigned: i64,
    pub customers_converted: i64,
    pub activities_logged: i64,
    pub tasks_assigned: i64,
}

/// Local part of an email address, used as the default username.
pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default().trim();
    if local.is_empty() {
        "user".to_string()
    } else {
        local.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip_and_rights() {
        for role in [UserRole::Admin, UserRole::Manager, UserRole::SalesExecutive] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert!(UserRole::Admin.is_manager());
        assert!(UserRole::Manager.is_manager());
        assert!(!UserRole::SalesExecutive.is_manager());
        assert_eq!(UserRole::parse("owner"), None);
    }

    #[test]
    fn username_uses_local_part() {
        assert_eq!(username_from_email("Jane.Doe@acme.com"), "jane.doe");
        assert_eq!(username_from_email("@acme.com"), "user");
    }

    #[test]
    fn invite_defaults_to_sales_executive() {
        let req: InviteUserRequest = serde_json::from_value(serde_json::json!({
            "email": "rep@acme.com",
            "first_name": "Rep",
            "last_name": "One"
        }))
        .unwrap();
        assert_eq!(req.role, UserRole::SalesExecutive);
        assert!(req.validate().is_ok());
    }
}
