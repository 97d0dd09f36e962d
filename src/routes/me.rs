use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;
use validator::Validate;

use super::common::hash_password;
use crate::api::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::{password, RequireAuth};
use crate::domain::users::{ChangePasswordRequest, UpdateProfileRequest, User, USER_COLUMNS};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};

/// GET /api/v1/me
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1 AND company_id = $2",
        USER_COLUMNS
    ))
    .bind(auth.user_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(DataResponse::new(user))
}

/// PUT /api/v1/me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users SET
            first_name = COALESCE($1, first_name),
            last_name = COALESCE($2, last_name),
            phone = COALESCE($3, phone),
            updated_at = NOW()
        WHERE id = $4 AND company_id = $5
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(&req.phone)
    .bind(auth.user_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(DataResponse::new(user))
}

/// POST /api/v1/me/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let current_hash: String = sqlx::query_scalar(
        "SELECT password_hash FROM users WHERE id = $1 AND company_id = $2",
    )
    .bind(auth.user_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !password::verify_password(&req.current_password, &current_hash).unwrap_or(false) {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    password::validate_new_password(&req.new_password, &req.confirm_password)
        .map_err(ApiError::BadRequest)?;

    let new_hash = hash_password(&req.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(&new_hash)
        .bind(auth.user_id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = auth.user_id, "Password changed");

    audit::record(
        &state.db,
        AuditEntry::new(auth.company_id, Some(auth.user_id), "password_changed", "Password changed")
            .resource("user", auth.user_id),
        &meta,
    )
    .await;

    Ok(MessageResponse::new("Password changed successfully"))
}
