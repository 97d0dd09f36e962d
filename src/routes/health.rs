use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: &'static str,
    pub cache: &'static str,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let cache_probe = async {
        match &state.cache {
            Some(cache) => Some(cache.health_check().await.is_ok()),
            None => None,
        }
    };

    // Probe services in parallel
    let (db_ok, cache_ok) = tokio::join!(db::health_check(&state.db), cache_probe);

    let (status, status_code) = overall(db_ok, cache_ok);

    (
        status_code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            services: ServiceHealth {
                database: if db_ok { "ok" } else { "error" },
                cache: match cache_ok {
                    Some(true) => "ok",
                    Some(false) => "error",
                    None => "disabled",
                },
            },
        }),
    )
}

/// The database is critical; a configured cache that is down only degrades.
fn overall(db_ok: bool, cache_ok: Option<bool>) -> (&'static str, StatusCode) {
    match (db_ok, cache_ok) {
        (false, _) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
        (true, Some(false)) => ("degraded", StatusCode::OK),
        (true, _) => ("healthy", StatusCode::OK),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{create_app, test_state};
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn status_from_probes() {
        assert_eq!(overall(true, None), ("healthy", StatusCode::OK));
        assert_eq!(overall(true, Some(true)), ("healthy", StatusCode::OK));
        assert_eq!(overall(true, Some(false)), ("degraded", StatusCode::OK));
        assert_eq!(
            overall(false, Some(true)),
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
        );
    }

    #[tokio::test]
    async fn unreachable_database_reports_unhealthy() {
        let app = create_app(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["services"]["database"], "error");
        assert_eq!(body["services"]["cache"], "disabled");
    }
}
