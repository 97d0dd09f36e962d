//! Product catalogue routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::common::like_pattern;
use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::products::{
    validate_pricing, CreateProductRequest, Product, ProductListQuery, UpdateProductRequest,
    PRODUCT_COLUMNS,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestMeta;
use crate::services::audit::{self, AuditEntry};

const PRODUCT_FILTER: &str = r#"
    WHERE company_id = $1
      AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2
           OR sku ILIKE $2 OR category ILIKE $2)
      AND ($3::boolean IS NULL OR is_active = $3)
"#;

const SKU_TAKEN: &str = "A product with this SKU already exists";

/// GET /api/v1/products
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<ProductListQuery>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let search = like_pattern(query.search.as_deref());

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products {}", PRODUCT_FILTER))
            .bind(auth.company_id)
            .bind(&search)
            .bind(query.active)
            .fetch_one(&state.db)
            .await?;

    let products = sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products {} ORDER BY name ASC LIMIT $4 OFFSET $5",
        PRODUCT_COLUMNS, PRODUCT_FILTER
    ))
    .bind(auth.company_id)
    .bind(&search)
    .bind(query.active)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(products, &pagination, total))
}

/// POST /api/v1/products
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    validate_pricing(Some(req.unit_price), req.cost_price, Some(req.tax_rate))
        .map_err(ApiError::BadRequest)?;

    let product = sqlx::query_as::<_, Product>(&format!(
        r#"
        INSERT INTO products
            (company_id, name, description, sku, category, unit_price, cost_price, tax_rate,
             is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        PRODUCT_COLUMNS
    ))
    .bind(auth.company_id)
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(req.sku.as_deref().map(str::trim))
    .bind(&req.category)
    .bind(req.unit_price)
    .bind(req.cost_price)
    .bind(req.tax_rate)
    .bind(req.is_active)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::unique_or_db(e, SKU_TAKEN))?;

    tracing::info!(company_id = auth.company_id, product_id = product.id, "Product created");

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "product_created",
            format!("Created product {}", product.name),
        )
        .resource("product", product.id),
        &meta,
    )
    .await;

    Ok(Created(product))
}

/// GET /api/v1/products/:id
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products WHERE id = $1 AND company_id = $2",
        PRODUCT_COLUMNS
    ))
    .bind(product_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Product not found"))?;

    Ok(DataResponse::new(product))
}

/// PUT /api/v1/products/:id
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    validate_pricing(req.unit_price, req.cost_price, req.tax_rate).map_err(ApiError::BadRequest)?;

    let product = sqlx::query_as::<_, Product>(&format!(
        r#"
        UPDATE products SET
            name = COALESCE($1, name),
            description = COALESCE($2, description),
            sku = COALESCE($3, sku),
            category = COALESCE($4, category),
            unit_price = COALESCE($5, unit_price),
            cost_price = COALESCE($6, cost_price),
            tax_rate = COALESCE($7, tax_rate),
            is_active = COALESCE($8, is_active),
            updated_at = NOW()
        WHERE id = $9 AND company_id = $10
        RETURNING {}
        "#,
        PRODUCT_COLUMNS
    ))
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.description)
    .bind(req.sku.as_deref().map(str::trim))
    .bind(&req.category)
    .bind(req.unit_price)
    .bind(req.cost_price)
    .bind(req.tax_rate)
    .bind(req.is_active)
    .bind(product_id)
    .bind(auth.company_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::unique_or_db(e, SKU_TAKEN))?
    .ok_or_else(|| ApiError::not_found("Product not found"))?;

    audit::record(
        &state.db,
        AuditEntry::new(
            auth.company_id,
            Some(auth.user_id),
            "product_updated",
            format!("Updated product {}", product.name),
        )
        .resource("product", product.id),
        &meta,
    )
    .await;

    Ok(DataResponse::new(product))
}

/// DELETE /api/v1/products/:id
///
/// Products used on a quotation or invoice line cannot be removed; deactivate them instead.
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    meta: RequestMeta,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let deleted = sqlx::query("DELETE FROM products WHERE id = $1 AND company_id = $2")
        .bind(product_id)
        .bind(auth.company_id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            ApiError::in_use_or_db(
                e,
                "Product is used on quotations or invoices and cannot be deleted",
            )
        })?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    audit::record(
        &state.db,
        AuditEntry::new(auth.company_id, Some(auth.user_id), "product_deleted", "Deleted product")
            .resource("product", product_id),
        &meta,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
