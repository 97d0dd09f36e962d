use serde::{Deserialize, Serialize};

/// JWT claims issued at login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: i64,

    /// Tenant the user belongs to
    pub company_id: i64,

    pub email: String,

    /// Role at issue time; the current role is re-read on each request
    pub role: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}
