use axum::{http::HeaderValue, Router};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::TokenIssuer;
use crate::config::Settings;
use crate::middleware::request_id_layer;
use crate::routes;
use crate::services::{LoginThrottle, Mailer, PaymentGateways, RedisCache};

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub tokens: TokenIssuer,
    /// `None` when Redis is not configured or was unreachable at startup
    pub cache: Option<RedisCache>,
    pub mailer: Mailer,
    pub payments: PaymentGateways,
    pub login_throttle: LoginThrottle,
}

impl AppState {
    pub fn new(
        db: PgPool,
        settings: Settings,
        cache: Option<RedisCache>,
        mailer: Mailer,
        payments: PaymentGateways,
    ) -> Arc<Self> {
        let tokens = TokenIssuer::new(&settings.secret_key, settings.jwt_expiry_hours);
        let login_throttle = LoginThrottle::new(
            settings.login_max_attempts,
            Duration::from_secs(settings.login_window_seconds),
        );

        Arc::new(Self {
            db,
            settings,
            tokens,
            cache,
            mailer,
            payments,
            login_throttle,
        })
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // DEBUG spans keep INFO output to one line per request
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let (set_request_id, propagate_request_id) = request_id_layer();

    Router::new()
        .merge(routes::health_router())
        .nest("/api/v1", routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let max_age = if settings.env.is_dev() {
        Duration::from_secs(86400)
    } else {
        Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
        ]))
        .allow_credentials(true)
        .max_age(max_age)
}

/// State over a pool that never connects unless a handler touches it.
#[cfg(test)]
pub fn test_state() -> Arc<AppState> {
    let settings = Settings::for_tests();
    let db = crate::db::lazy_pool(&settings).unwrap();
    test_state_on(db)
}

#[cfg(test)]
pub fn test_state_on(db: PgPool) -> Arc<AppState> {
    let settings = Settings::for_tests();
    let mailer = Mailer::disabled(&settings.mail.default_sender);
    let payments =
        PaymentGateways::new(settings.stripe.clone(), settings.razorpay.clone()).unwrap();
    AppState::new(db, settings, None, mailer, payments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn send(request: Request<Body>) -> (StatusCode, serde_json::Value, Option<String>) {
        send_to(test_state(), request).await
    }

    async fn send_to(
        state: Arc<AppState>,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value, Option<String>) {
        let app = create_app(state);
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body, request_id)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let (status, body, request_id) = send(get("/api/v1/leads")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Missing authorization token");
        assert!(request_id.is_some());
    }

    #[tokio::test]
    async fn malformed_and_forged_tokens_are_rejected() {
        let request = Request::builder()
            .uri("/api/v1/me")
            .header("authorization", "Token abc")
            .body(Body::empty())
            .unwrap();
        let (status, body, _) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid authorization format");

        let forged = TokenIssuer::new("some-other-secret", 1)
            .issue(1, 1, "a@example.com", "admin")
            .unwrap();
        let request = Request::builder()
            .uri("/api/v1/dashboard")
            .header("authorization", format!("Bearer {}", forged.token))
            .body(Body::empty())
            .unwrap();
        let (status, body, _) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn manager_routes_require_a_token_too() {
        let (status, _, _) = send(get("/api/v1/users")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _, _) = send(get("/api/v1/admin/overview")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (status, _, _) = send(get("/api/v1/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn client_request_id_is_echoed() {
        let request = Request::builder()
            .uri("/api/v1/plans")
            .header("x-request-id", "req-123")
            .body(Body::empty())
            .unwrap();
        let (status, body, request_id) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(request_id.as_deref(), Some("req-123"));
        let plans = body["data"].as_array().unwrap();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[1]["value"], "pro");
        assert_eq!(plans[1]["popular"], true);
    }

    #[tokio::test]
    async fn unsigned_webhook_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/billing/webhooks/stripe")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _, _) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn usage_is_limited_to_managers(pool: PgPool) {
        crate::seed::run(&pool).await.unwrap();
        let state = test_state_on(pool);
        let usage_as = |user_id: i64, email: &str| {
            let token = state.tokens.issue(user_id, 1, email, "any").unwrap().token;
            Request::builder()
                .uri("/api/v1/billing/usage")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap()
        };

        let sales = usage_as(3, "sales@democompany.com");
        let (status, _, _) = send_to(state.clone(), sales).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let manager = usage_as(2, "manager@democompany.com");
        let (status, body, _) = send_to(state.clone(), manager).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["users"]["current"], 3.0);
    }
}
