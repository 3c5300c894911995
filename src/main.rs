//! FraudScore Server
//!
//! REST API for scoring financial transactions with a pre-trained
//! classifier and persisting the results.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     FRAUDSCORE SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐  │
//! │  │  API      │  │  Auth     │  │  Feature Deriver +      │  │
//! │  │  Gateway  │  │  Service  │  │  ONNX Classifier        │  │
//! │  │  (Axum)   │  │  (JWT)    │  │                         │  │
//! │  └─────┬─────┘  └─────┬─────┘  └────────────┬────────────┘  │
//! │        └──────────────┼────────────────────-┘               │
//! │                       ▼                                     │
//! │                ┌─────────────┐                              │
//! │                │ PostgreSQL  │                              │
//! │                └─────────────┘                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod features;
mod classifier;
mod models;
mod handlers;
mod middleware;
mod error;

use axum::{
    Router,
    routing::{get, post, put, patch, delete},
    middleware as axum_middleware,
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::net::SocketAddr;

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "fraudscore_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("FraudScore Server starting...");
    tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));
    tracing::info!("Classifier artifact: {}", config.model_path);

    // Initialize database pool
    let pool = db::create_pool(&config.database_url).await
        .expect("Failed to create database pool");

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await
        .expect("Failed to run migrations");

    // Build application state
    let state = AppState {
        pool,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route("/api/v1/auth/register", post(handlers::auth::register));

    // Scoring and CRUD routes (user JWT auth)
    let api_routes = Router::new()
        // Prediction
        .route("/api/v1/predict", post(handlers::transactions::create))
        .route("/api/v1/predict", get(handlers::transactions::list))
        .route("/api/v1/predict/file", post(handlers::transactions::upload))
        .route("/api/v1/predict/:id", get(handlers::transactions::retrieve))
        .route("/api/v1/predict/:id", put(handlers::transactions::update))
        .route("/api/v1/predict/:id", patch(handlers::transactions::partial_update))
        .route("/api/v1/predict/:id", delete(handlers::transactions::destroy))

        // Flagged records
        .route("/api/v1/frauds", get(handlers::transactions::frauds))

        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_user_auth
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
