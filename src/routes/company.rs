use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;
use validator::Validate;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::{RequireAuth, RequireManager};
use crate::domain::companies::{is_valid_subdomain, Company, UpdateCompanyRequest, COMPANY_COLUMNS};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};

/// GET /api/v1/company
pub async fn get_company(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let company = sqlx::query_as::<_, Company>(&format!(
        "SELECT {} FROM companies WHERE id = $1",
        COMPANY_COLUMNS
    ))
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Company not found"))?;

    Ok(DataResponse::new(company))
}

/// PUT /api/v1/company
pub async fn update_company(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireManager,
    Json(req): Json<UpdateCompanyRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let subdomain = req.subdomain.as_deref().map(|s| s.trim().to_lowercase());
    if let Some(sub) = &subdomain {
        if !is_valid_subdomain(sub) {
            return Err(ApiError::bad_request(
                "Subdomain must be 1-50 lower-case letters or digits",
            ));
        }
    }

    let company = sqlx::query_as::<_, Company>(&format!(
        r#"
        UPDATE companies SET
            name = COALESCE($1, name),
            subdomain = COALESCE($2, subdomain),
            domain = COALESCE($3, domain),
            address = COALESCE($4, address),
            city = COALESCE($5, city),
            state = COALESCE($6, state),
            zip_code = COALESCE($7, zip_code),
            country = COALESCE($8, country),
            industry = COALESCE($9, industry),
            size = COALESCE($10, size),
            phone = COALESCE($11, phone),
            email = COALESCE($12, email),
            website = COALESCE($13, website),
            logo_url = COALESCE($14, logo_url),
            updated_at = NOW()
        WHERE id = $15
        RETURNING {}
        "#,
        COMPANY_COLUMNS
    ))
    .bind(req.name.as_deref().map(str::trim))
    .bind(&subdomain)
    .bind(&req.domain)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&req.state)
    .bind(&req.zip_code)
    .bind(&req.country)
    .bind(&req.industry)
    .bind(&req.size)
    .bind(&req.phone)
    .bind(&req.email)
    .bind(&req.website)
    .bind(&req.logo_url)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::unique_or_db(e, "Subdomain already taken"))?
    .ok_or_else(|| ApiError::not_found("Company not found"))?;

    tracing::info!(company_id = company.id, "Company settings updated");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "company_updated",
            "Company settings updated",
        )
        .resource("company", company.id),
        &meta,
    )
    .await;

    Ok(DataResponse::new(company))
}
