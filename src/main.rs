mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod seed;
mod services;

use anyhow::{Context, Result};

use services::{Mailer, PaymentGateways, RedisCache};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting SalesDesk backend"
    );

    if settings.uses_dev_secret() {
        tracing::warn!("SECRET_KEY not set, using the development signing key");
    }

    // Create database pool
    let pool = db::create_pool(&settings).await?;

    if settings.run_migrations {
        db::run_migrations(&pool).await?;
    }

    if settings.seed_demo_data {
        let report = seed::run(&pool).await.context("Failed to seed demo data")?;
        tracing::info!(inserted = report.total_inserted(), "Demo data seeded");
    }

    // Redis is optional; the dashboard falls back to direct queries
    let cache = match &settings.redis_url {
        Some(url) => match RedisCache::new(url, settings.redis_cache_ttl_seconds).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, dashboard cache disabled");
                None
            }
        },
        None => {
            tracing::info!("REDIS_URL not set, dashboard cache disabled");
            None
        }
    };

    let mailer = Mailer::new(&settings.mail)?;
    let payments = PaymentGateways::new(settings.stripe.clone(), settings.razorpay.clone())?;

    // Create application state
    let server_addr = settings.server_addr.clone();
    let state = app::AppState::new(pool, settings, cache, mailer, payments);

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_addr))?;
    tracing::info!("Listening on {}", server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM. A handler that fails to install never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
