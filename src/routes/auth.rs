//! Registration and session routes
//!
//! Company signup, joining a tenant, login, token refresh and the
//! password reset flow.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{Duration, Utc};
use std::sync::Arc;
use validator::Validate;

use super::common::{self, hash_password};
use crate::api::{Created, DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::{password, RequireAuth};
use crate::domain::companies::{
    derive_subdomain, numbered_candidate, Company, RegisterCompanyRequest, COMPANY_COLUMNS,
};
use crate::domain::plans::Plan;
use crate::domain::users::{
    username_from_email, AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterUserRequest,
    ResetPasswordRequest, TokenResponse, User, UserRole, USER_COLUMNS,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{RequestMeta, Tenant};
use crate::services::audit::{self, AuditEntry};

const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// Credentials and tenant of a login candidate.
#[derive(sqlx::FromRow)]
struct LoginRow {
    id: i64,
    company_id: i64,
    password_hash: String,
    is_active: bool,
    subdomain: String,
    company_active: bool,
}

async fn fetch_user(state: &AppState, user_id: i64) -> ApiResult<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn fetch_company(state: &AppState, company_id: i64) -> ApiResult<Company> {
    sqlx::query_as::<_, Company>(&format!(
        "SELECT {} FROM companies WHERE id = $1",
        COMPANY_COLUMNS
    ))
    .bind(company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Company not found"))
}

fn session(state: &AppState, user: User, company: Option<Company>) -> ApiResult<AuthResponse> {
    let issued = state
        .tokens
        .issue(user.id, user.company_id, &user.email, &user.role)
        .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))?;

    Ok(AuthResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
        user,
        company,
    })
}

/// GET /api/v1/plans
pub async fn list_plans() -> impl IntoResponse {
    DataResponse::new(Plan::catalogue())
}

/// POST /api/v1/auth/register-company
///
/// Creates a company on the starter plan with its first admin.
pub async fn register_company(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Json(req): Json<RegisterCompanyRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    password::validate_new_password(&req.password, &req.confirm_password)
        .map_err(ApiError::BadRequest)?;

    let email = req.email.trim().to_lowercase();
    if common::email_taken(&state.db, &email).await? {
        return Err(ApiError::conflict("Email already registered"));
    }

    let password_hash = hash_password(&req.password)?;
    let username = common::unique_username(&state.db, &username_from_email(&email)).await?;
    let plan = Plan::Starter;
    let limits = plan.limits();

    let mut tx = state.db.begin().await?;

    let base = derive_subdomain(&req.company_name);
    let mut attempt = 0u32;
    let subdomain = loop {
        let candidate = numbered_candidate(&base, attempt);
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM companies WHERE subdomain = $1)")
                .bind(&candidate)
                .fetch_one(&mut *tx)
                .await?;
        if !taken {
            break candidate;
        }
        attempt += 1;
    };

    let company = sqlx::query_as::<_, Company>(&format!(
        r#"
        INSERT INTO companies
            (name, subdomain, website, phone, size, address, city, state, zip_code, country,
             industry, email, subscription_plan, max_users, max_storage_gb)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING {}
        "#,
        COMPANY_COLUMNS
    ))
    .bind(req.company_name.trim())
    .bind(&subdomain)
    .bind(&req.company_website)
    .bind(&req.company_phone)
    .bind(&req.company_size)
    .bind(&req.company_address)
    .bind(&req.company_city)
    .bind(&req.company_state)
    .bind(&req.company_zip)
    .bind(&req.company_country)
    .bind(&req.company_industry)
    .bind(&email)
    .bind(plan.as_str())
    .bind(limits.max_users)
    .bind(limits.max_storage_gb)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::unique_or_db(e, "Company subdomain already taken"))?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (company_id, email, username, first_name, last_name, password_hash,
            role, phone)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(company.id)
    .bind(&email)
    .bind(&username)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(&password_hash)
    .bind(UserRole::Admin.as_str())
    .bind(&req.phone)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::unique_or_db(e, "Email or username already registered"))?;

    tx.commit().await?;

    tracing::info!(
        company_id = company.id,
        user_id = user.id,
        subdomain = %company.subdomain,
        "Company registered"
    );

    audit::record(
        &state.db,
        AuditEntry::new(
            company.id,
            Some(user.id),
            "company_registration",
            format!("Company {} registered", company.name),
        )
        .resource("company", company.id),
        &meta,
    )
    .await;

    Ok(Created(session(&state, user, Some(company))?))
}

/// POST /api/v1/auth/register
///
/// Joins an existing company as a sales executive.
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Tenant(host_tenant): Tenant,
    meta: RequestMeta,
    Json(req): Json<RegisterUserRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    password::validate_new_password(&req.password, &req.confirm_password)
        .map_err(ApiError::BadRequest)?;

    let subdomain = common::filter_value(req.subdomain.as_deref())
        .map(str::to_lowercase)
        .or(host_tenant)
        .ok_or_else(|| ApiError::bad_request("Company subdomain is required"))?;

    let company_id: i64 = sqlx::query_scalar(
        "SELECT id FROM companies WHERE subdomain = $1 AND is_active = TRUE",
    )
    .bind(&subdomain)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Company not found"))?;

    let email = req.email.trim().to_lowercase();
    if common::email_taken(&state.db, &email).await? {
        return Err(ApiError::conflict("Email already registered"));
    }

    let username = match common::filter_value(req.username.as_deref()) {
        Some(name) => {
            let taken: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                    .bind(name)
                    .fetch_one(&state.db)
                    .await?;
            if taken {
                return Err(ApiError::conflict("Username already taken"));
            }
            name.to_string()
        }
        None => common::unique_username(&state.db, &username_from_email(&email)).await?,
    };

    common::ensure_user_capacity(&state.db, company_id).await?;

    let password_hash = hash_password(&req.password)?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (company_id, email, username, first_name, last_name, password_hash, role)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(company_id)
    .bind(&email)
    .bind(&username)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(&password_hash)
    .bind(UserRole::SalesExecutive.as_str())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::unique_or_db(e, "Email or username already registered"))?;

    tracing::info!(company_id, user_id = user.id, "User self-registered");

    audit::record(
        &state.db,
        AuditEntry::new(
            company_id,
            Some(user.id),
            "user_registration",
            format!("User {} registered", user.email),
        )
        .resource("user", user.id),
        &meta,
    )
    .await;

    let company = fetch_company(&state, company_id).await?;
    Ok(Created(session(&state, user, Some(company))?))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    meta: RequestMeta,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    let throttle_key =
        crate::services::LoginThrottle::key(&email, meta.ip_address.as_deref());
    if state.login_throttle.is_blocked(&throttle_key) {
        tracing::warn!(email = %email, "Login throttled");
        return Err(ApiError::TooManyRequests(
            "Too many failed login attempts. Try again later.".to_string(),
        ));
    }

    let row = sqlx::query_as::<_, LoginRow>(
        r#"
        SELECT u.id, u.company_id, u.password_hash, u.is_active,
               c.subdomain, c.is_active AS company_active
        FROM users u
        JOIN companies c ON c.id = u.company_id
        WHERE LOWER(u.email) = $1
        "#,
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await?;

    let verified = match &row {
        Some(row) => password::verify_password(&req.password, &row.password_hash).unwrap_or(false),
        None => false,
    };

    let row = match row {
        Some(row) if verified => row,
        _ => {
            state.login_throttle.record_failure(&throttle_key);
            tracing::info!(email = %email, "Failed login attempt");
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
    };

    if !row.is_active || !row.company_active {
        return Err(ApiError::unauthorized("Account deactivated"));
    }

    if let Some(tenant) = tenant {
        if tenant != row.subdomain {
            return Err(ApiError::forbidden("Access denied for this company"));
        }
    }

    state.login_throttle.clear(&throttle_key);

    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(row.id)
        .execute(&state.db)
        .await?;

    let user = fetch_user(&state, row.id).await?;
    let company = fetch_company(&state, row.company_id).await?;

    tracing::info!(company_id = row.company_id, user_id = row.id, "User logged in");

    audit::record(
        &state.db,
        AuditEntry::new(row.company_id, Some(row.id), "user_login", "User logged in")
            .resource("user", row.id),
        &meta,
    )
    .await;

    Ok(DataResponse::new(session(&state, user, Some(company))?))
}

/// POST /api/v1/auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let issued = state
        .tokens
        .issue(auth.user_id, auth.company_id, &auth.email, auth.role.as_str())
        .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))?;

    Ok(DataResponse::new(TokenResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
    }))
}

/// POST /api/v1/auth/logout
///
/// Tokens are stateless; this only records the event.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> impl IntoResponse {
    audit::record(
        &state.db,
        AuditEntry::new(auth.company_id, Some(auth.user_id), "user_logout", "User logged out")
            .resource("user", auth.user_id),
        &meta,
    )
    .await;

    MessageResponse::new("Logged out")
}

/// POST /api/v1/auth/forgot-password
///
/// Answers the same way whether or not the email exists.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();

    #[derive(sqlx::FromRow)]
    struct ResetTarget {
        id: i64,
        first_name: String,
        subdomain: String,
    }

    let target = sqlx::query_as::<_, ResetTarget>(
        r#"
        SELECT u.id, u.first_name, c.subdomain
        FROM users u
        JOIN companies c ON c.id = u.company_id
        WHERE LOWER(u.email) = $1 AND u.is_active = TRUE
        "#,
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await?;

    if let Some(target) = target {
        let (token, token_hash) = password::reset_token();
        let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);

        sqlx::query(
            "UPDATE users SET reset_token_hash = $1, reset_token_expires_at = $2, \
             updated_at = NOW() WHERE id = $3",
        )
        .bind(&token_hash)
        .bind(expires_at)
        .bind(target.id)
        .execute(&state.db)
        .await?;

        let link = state.settings.tenant_url(
            &target.subdomain,
            "/auth/reset-password",
            &[("token", token.as_str())],
        );
        let body = format!(
            "Hello {},\n\nUse the link below to reset your password. \
             It expires in one hour.\n\n{}\n\nIf you did not ask for this, ignore this email.",
            target.first_name, link
        );
        state
            .mailer
            .send_best_effort(&email, "Password reset request", body)
            .await;

        tracing::info!(user_id = target.id, "Password reset requested");
    }

    Ok(MessageResponse::new(
        "If the email is registered, a reset link has been sent",
    ))
}

/// POST /api/v1/auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    password::validate_new_password(&req.new_password, &req.confirm_password)
        .map_err(ApiError::BadRequest)?;

    #[derive(sqlx::FromRow)]
    struct ResetOwner {
        id: i64,
        company_id: i64,
    }

    let owner = sqlx::query_as::<_, ResetOwner>(
        r#"
        SELECT id, company_id FROM users
        WHERE reset_token_hash = $1 AND reset_token_expires_at > NOW()
        "#,
    )
    .bind(password::hash_token(req.token.trim()))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;

    let password_hash = hash_password(&req.new_password)?;

    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $1, reset_token_hash = NULL, reset_token_expires_at = NULL,
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(&password_hash)
    .bind(owner.id)
    .execute(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry::new(
            owner.company_id,
            Some(owner.id),
            "user_password_reset",
            "Password reset via emailed token",
        )
        .resource("user", owner.id),
        &meta,
    )
    .await;

    Ok(MessageResponse::new("Password has been reset"))
}

#[cfg(test)]
mod tests {
    use crate::app::{create_app, test_state};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn register_company_rejects_mismatched_passwords_before_touching_the_db() {
        let response = create_app(test_state())
            .oneshot(post_json(
                "/api/v1/auth/register-company",
                serde_json::json!({
                    "company_name": "Acme",
                    "first_name": "Ada",
                    "last_name": "Admin",
                    "email": "ada@acme.test",
                    "password": "password123",
                    "confirm_password": "password124"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_validates_email_format() {
        let response = create_app(test_state())
            .oneshot(post_json(
                "/api/v1/auth/login",
                serde_json::json!({ "email": "not-an-email", "password": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_password_checks_confirmation_first() {
        let response = create_app(test_state())
            .oneshot(post_json(
                "/api/v1/auth/reset-password",
                serde_json::json!({
                    "token": "abc",
                    "new_password": "short",
                    "confirm_password": "short"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
