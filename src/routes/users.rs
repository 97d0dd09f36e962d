//! User management routes
//!
//! Manager-only endpoints for inviting, editing and (de)activating the
//! people of a company.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use super::common::{self, hash_password, like_pattern};
use crate::api::{Created, DataResponse, MessageResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{password, RequireManager};
use crate::domain::activities::{Activity, ACTIVITY_SELECT};
use crate::domain::users::{
    username_from_email, InviteUserRequest, InviteUserResponse, UpdateUserRequest, User,
    UserListQuery, UserStats, USER_COLUMNS,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub stats: UserStats,
    pub recent_activities: Vec<Activity>,
}

const USER_FILTER: &str = r#"
    WHERE company_id = $1
      AND ($2::text IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2
           OR email ILIKE $2 OR username ILIKE $2)
      AND ($3::text IS NULL OR role = $3)
      AND ($4::boolean IS NULL OR is_active = $4)
"#;

async fn load_user(state: &AppState, company_id: i64, user_id: i64) -> ApiResult<User> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1 AND company_id = $2",
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Reactivating an inactive user takes a seat on the plan.
fn takes_a_seat(currently_active: bool, requested: Option<bool>) -> bool {
    !currently_active && requested == Some(true)
}

async fn company_subdomain(state: &AppState, company_id: i64) -> ApiResult<String> {
    Ok(sqlx::query_scalar("SELECT subdomain FROM companies WHERE id = $1")
        .bind(company_id)
        .fetch_one(&state.db)
        .await?)
}

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<UserListQuery>,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    let search = like_pattern(filters.search.as_deref());
    let role = common::filter_value(filters.role.as_deref());
    let active = match common::filter_value(filters.status.as_deref()) {
        Some("active") => Some(true),
        Some("inactive") => Some(false),
        Some(other) => return Err(ApiError::bad_request(format!("Invalid status: {}", other))),
        None => None,
    };

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users {}", USER_FILTER))
        .bind(auth.company_id)
        .bind(&search)
        .bind(role)
        .bind(active)
        .fetch_one(&state.db)
        .await?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users {} ORDER BY created_at DESC LIMIT $5 OFFSET $6",
        USER_COLUMNS, USER_FILTER
    ))
    .bind(auth.company_id)
    .bind(&search)
    .bind(role)
    .bind(active)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(users, &pagination, total))
}

/// POST /api/v1/users
///
/// Invites a user with a temporary password sent by email.
pub async fn invite_user(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireManager,
    Json(req): Json<InviteUserRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    if common::email_taken(&state.db, &email).await? {
        return Err(ApiError::conflict("Email already registered"));
    }

    let username = match common::filter_value(req.username.as_deref()) {
        Some(name) => name.to_string(),
        None => common::unique_username(&state.db, &username_from_email(&email)).await?,
    };

    common::ensure_user_capacity(&state.db, auth.company_id).await?;

    let temporary = password::temporary_password();
    let password_hash = hash_password(&temporary)?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (company_id, email, username, first_name, last_name, password_hash,
            role, phone)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(auth.company_id)
    .bind(&email)
    .bind(&username)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(&password_hash)
    .bind(req.role.as_str())
    .bind(&req.phone)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::unique_or_db(e, "Email or username already registered"))?;

    let subdomain = company_subdomain(&state, auth.company_id).await?;
    let body = format!(
        "Hello {},\n\nYou have been invited to the {} workspace.\n\n\
         Login: {}\nUsername: {}\nTemporary password: {}\n\n\
         Please change your password after signing in.",
        user.first_name,
        subdomain,
        state.settings.tenant_url(&subdomain, "/auth/login", &[]),
        user.email,
        temporary
    );
    let email_sent = state
        .mailer
        .send_best_effort(&user.email, "You have been invited", body)
        .await;

    tracing::info!(company_id = auth.company_id, user_id = user.id, email_sent, "User invited");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "user_created",
            format!("Invited {} as {}", user.email, user.role),
        )
        .resource("user", user.id),
        &meta,
    )
    .await;

    Ok(Created(InviteUserResponse { user, email_sent }))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    let user = load_user(&state, auth.company_id, user_id).await?;

    let stats = sqlx::query_as::<_, UserStats>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM leads WHERE assigned_to_id = $1 AND company_id = $2) AS
             leads_assigned,
            (SELECT COUNT(*) FROM customers c JOIN leads l ON l.id = c.lead_id
              WHERE l.assigned_to_id = $1 AND c.company_id = $2) AS customers_converted,
            (SELECT COUNT(*) FROM activities WHERE user_id = $1 AND company_id = $2) AS
             activities_logged,
            (SELECT COUNT(*) FROM tasks WHERE assigned_to_id = $1 AND company_id = $2) AS
             tasks_assigned
        "#,
    )
    .bind(user_id)
    .bind(auth.company_id)
    .fetch_one(&state.db)
    .await?;

    let recent_activities = sqlx::query_as::<_, Activity>(&format!(
        "{} WHERE a.user_id = $1 AND a.company_id = $2 ORDER BY a.created_at DESC LIMIT 10",
        ACTIVITY_SELECT
    ))
    .bind(user_id)
    .bind(auth.company_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(UserDetail {
        user,
        stats,
        recent_activities,
    }))
}

/// PUT /api/v1/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireManager,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    if user_id == auth.user_id && req.is_active == Some(false) {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }
    if user_id == auth.user_id && req.role.is_some_and(|r| !r.is_manager()) {
        return Err(ApiError::bad_request("You cannot remove your own manager role"));
    }

    if req.is_active == Some(true) {
        let current = load_user(&state, auth.company_id, user_id).await?;
        if takes_a_seat(current.is_active, req.is_active) {
            common::ensure_user_capacity(&state.db, auth.company_id).await?;
        }
    }

    let email = req.email.as_deref().map(|e| e.trim().to_lowercase());

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users SET
            first_name = COALESCE($1, first_name),
            last_name = COALESCE($2, last_name),
            email = COALESCE($3, email),
            phone = COALESCE($4, phone),
            role = COALESCE($5, role),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $7 AND company_id = $8
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(&email)
    .bind(&req.phone)
    .bind(req.role.map(|r| r.as_str()))
    .bind(req.is_active)
    .bind(user_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::unique_or_db(e, "Email already registered"))?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "user_updated",
            format!("Updated user {}", user.email),
        )
        .resource("user", user.id),
        &meta,
    )
    .await;

    Ok(DataResponse::new(user))
}

async fn set_active(
    state: &AppState,
    auth: &RequireManager,
    meta: &RequestMeta,
    user_id: i64,
    active: bool,
) -> ApiResult<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET is_active = $1, updated_at = NOW() \
         WHERE id = $2 AND company_id = $3 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(active)
    .bind(user_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    let (action, verb) = if active {
        ("user_activated", "Activated")
    } else {
        ("user_deactivated", "Deactivated")
    };

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            action,
            format!("{} user {}", verb, user.email),
        )
        .resource("user", user.id),
        meta,
    )
    .await;

    Ok(user)
}

/// POST /api/v1/users/:id/deactivate
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    if user_id == auth.user_id {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }
    let user = set_active(&state, &auth, &meta, user_id, false).await?;
    Ok(DataResponse::new(user))
}

/// POST /api/v1/users/:id/activate
pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    let current = load_user(&state, auth.company_id, user_id).await?;
    if takes_a_seat(current.is_active, Some(true)) {
        common::ensure_user_capacity(&state.db, auth.company_id).await?;
    }
    let user = set_active(&state, &auth, &meta, user_id, true).await?;
    Ok(DataResponse::new(user))
}

/// POST /api/v1/users/:id/reset-password
///
/// Replaces the password with a temporary one and emails it.
pub async fn reset_user_password(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireManager,
) -> ApiResult<impl IntoResponse> {
    let user = load_user(&state, auth.company_id, user_id).await?;

    let temporary = password::temporary_password();
    let password_hash = hash_password(&temporary)?;

    sqlx::query(
        "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2 AND company_id = $3",
    )
    .bind(&password_hash)
    .bind(user_id)
    .bind(auth.company_id)
    .execute(&state.db)
    .await?;

    let subdomain = company_subdomain(&state, auth.company_id).await?;
    let body = format!(
        "Hello {},\n\nYour password was reset by an administrator.\n\n\
         Login: {}\nTemporary password: {}\n\nPlease change it after signing in.",
        user.first_name,
        state.settings.tenant_url(&subdomain, "/auth/login", &[]),
        temporary
    );
    let email_sent = state
        .mailer
        .send_best_effort(&user.email, "Your password has been reset", body)
        .await;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "user_password_reset",
            format!("Reset password for {}", user.email),
        )
        .resource("user", user.id),
        &meta,
    )
    .await;

    let message = if email_sent {
        "Password reset. The new password was emailed to the user."
    } else {
        "Password reset, but the email could not be sent."
    };
    Ok(MessageResponse::new(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::users::UserRole;

    #[test]
    fn invite_defaults_to_sales_executive() {
        let req: InviteUserRequest = serde_json::from_value(serde_json::json!({
            "email": "new@acme.test",
            "first_name": "New",
            "last_name": "Hire"
        }))
        .unwrap();
        assert_eq!(req.role, UserRole::SalesExecutive);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn only_reactivation_counts_against_the_plan() {
        assert!(takes_a_seat(false, Some(true)));
        assert!(!takes_a_seat(true, Some(true)));
        assert!(!takes_a_seat(false, None));
        assert!(!takes_a_seat(false, Some(false)));
    }
}
