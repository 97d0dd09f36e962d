use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::AuthContext;
use crate::app::AppState;
use crate::domain::users::UserRole;
use crate::error::ErrorResponse;

/// Extractor that requires authentication
/// Use this in route handlers to require a valid bearer token
///
/// Example:
/// ```ignore
/// async fn protected_route(auth: RequireAuth) -> impl IntoResponse {
///     format!("Hello, user {}", auth.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Extractor for admin or manager routes.
#[derive(Debug, Clone)]
pub struct RequireManager(pub AuthContext);

impl std::ops::Deref for RequireManager {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
    AccountDisabled,
    NotManager,
    Database(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing authorization token",
            ),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid authorization format",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid or expired token",
            ),
            AuthError::AccountDisabled => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Account deactivated",
            ),
            AuthError::NotManager => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Manager privileges required",
            ),
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred",
                )
            }
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Current state of the token's user.
#[derive(sqlx::FromRow)]
struct AuthUserRow {
    email: String,
    role: String,
    is_active: bool,
    company_active: bool,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Extract Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidFormat)?;

        // Parse Bearer token
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat)?
            .trim();

        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = state.tokens.verify(token).map_err(|e| {
            tracing::warn!(error = %e, "JWT verification failed");
            AuthError::InvalidToken
        })?;

        // Tokens outlive deactivation and role changes, so re-check the row
        let row = sqlx::query_as::<_, AuthUserRow>(
            r#"
            SELECT u.email, u.role, u.is_active, c.is_active AS company_active
            FROM users u
            JOIN companies c ON c.id = u.company_id
            WHERE u.id = $1 AND u.company_id = $2
            "#,
        )
        .bind(claims.sub)
        .bind(claims.company_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| AuthError::Database(e.to_string()))?
        .ok_or_else(|| {
            tracing::warn!(user_id = claims.sub, "Token subject no longer exists");
            AuthError::InvalidToken
        })?;

        if !row.is_active || !row.company_active {
            tracing::warn!(user_id = claims.sub, "Token presented for inactive account");
            return Err(AuthError::AccountDisabled);
        }

        Ok(RequireAuth(AuthContext {
            user_id: claims.sub,
            company_id: claims.company_id,
            email: row.email,
            role: UserRole::parse(&row.role).unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireManager {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(context) = RequireAuth::from_request_parts(parts, state).await?;

        if !context.is_manager() {
            tracing::warn!(user_id = context.user_id, "Non-manager attempted a manager route");
            return Err(AuthError::NotManager);
        }

        Ok(RequireManager(context))
    }
}
