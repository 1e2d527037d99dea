//! Kalori Makanan API - Main Application Entry Point
//!
//! This is a REST API server for food calorie lookup. Every data endpoint
//! is gated by an API-key authentication and sliding-window rate-limiting
//! pipeline; administrative endpoints manage users, keys, and ledger
//! retention.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: API key (`X-API-Key`) with SHA-256 hashing
//! - **Rate limiting**: sliding-window log over a usage-event ledger,
//!   plus a global concurrency admission gate
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Validate that ledger retention covers the largest rate-limit window
//! 3. Create database connection pool and run migrations
//! 4. Build HTTP router with routes and the gating middleware
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let state = state::AppState::new(pool, &config);

    // Pruning at this horizon must never delete events a window count
    // still needs, so the retention has to cover the largest window.
    anyhow::ensure!(
        state.ledger_retention.as_secs() as i64 >= state.limiter.largest_window_secs(),
        "LEDGER_RETENTION_DAYS ({} days) is shorter than the largest rate-limit window ({}s)",
        config.ledger_retention_days,
        state.limiter.largest_window_secs(),
    );

    // Protected routes: everything here sits behind the API-key
    // authentication and rate-limiting pipeline
    let protected_routes = Router::new()
        .route("/foods/search", get(handlers::foods::search_foods))
        .route(
            "/foods/search/{food_name}/calories",
            get(handlers::foods::get_food_calories),
        )
        .route("/foods/{id}", get(handlers::foods::get_food))
        .route("/foods", get(handlers::foods::list_foods))
        .route("/categories", get(handlers::foods::list_categories))
        .route("/usage", get(handlers::usage::usage_status))
        // Apply the gating pipeline to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api_key,
        ));

    // Administrative routes: operator-facing, not behind the pipeline
    let admin_routes = Router::new()
        .route("/admin/users", post(handlers::admin::create_user))
        .route("/admin/api-keys", post(handlers::admin::issue_api_key))
        .route(
            "/admin/api-keys/{id}",
            delete(handlers::admin::deactivate_api_key),
        )
        .route(
            "/admin/usage-events/prune",
            post(handlers::admin::prune_usage_events),
        );

    // Combine with public routes
    let app = Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .merge(protected_routes)
        .merge(admin_routes)
        // Permissive CORS: this is a public lookup API
        .layer(CorsLayer::permissive())
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Share state with all handlers via State extraction
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
