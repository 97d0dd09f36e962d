use crate::domain::users::UserRole;

/// Authenticated user context, built from a verified token and the
/// user's current row.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User ID (from JWT sub claim)
    pub user_id: i64,

    /// Tenant every query must be scoped to
    pub company_id: i64,

    pub email: String,

    /// Role as stored now, not as issued
    pub role: UserRole,
}

impl AuthContext {
    pub fn is_manager(&self) -> bool {
        self.role.is_manager()
    }
}
