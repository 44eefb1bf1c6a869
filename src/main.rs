//! Spendbook - Personal Finance Tracking Backend
//! Mission: Record income and expenses behind bearer-token auth

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use dotenv::dotenv;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spendbook_backend::{
    auth::{api as auth_api, auth_middleware, AuthState, JwtHandler, UserStore},
    config::Config,
    middleware::request_logging,
    records::{api as records_api, RecordStore, RecordsState},
    uploads::FileStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    info!("Spendbook backend starting");

    let config = Config::from_env()?;

    let user_store = Arc::new(UserStore::new(&config.auth_db_path)?);
    let jwt_handler = Arc::new(JwtHandler::new(config.jwt_secret.clone()));
    let auth_state = AuthState::new(user_store, jwt_handler.clone());

    info!("Auth store initialized at: {}", config.auth_db_path);

    let record_store = Arc::new(RecordStore::new(&config.records_db_path)?);
    let file_store = Arc::new(FileStore::new(&config.upload_dir)?);
    let records_state = RecordsState::new(record_store, file_store);

    info!("Uploads directory: {}", config.upload_dir);

    // Public auth routes
    let auth_router = Router::new()
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .with_state(auth_state.clone());

    // Protected auth routes (password change, current user)
    let protected_auth = Router::new()
        .route("/api/auth/me", get(auth_api::get_current_user))
        .route("/api/auth/password", post(auth_api::change_password))
        .route_layer(middleware::from_fn_with_state(
            jwt_handler.clone(),
            auth_middleware,
        ))
        .with_state(auth_state);

    // Protected record routes; the guard resolves the owner identity
    let record_routes = Router::new()
        .route(
            "/api/incomes",
            get(records_api::list_incomes).post(records_api::create_income),
        )
        .route(
            "/api/incomes/:id",
            get(records_api::get_income)
                .put(records_api::update_income)
                .delete(records_api::delete_income),
        )
        .route(
            "/api/expenses",
            get(records_api::list_expenses).post(records_api::create_expense),
        )
        .route(
            "/api/expenses/:id",
            get(records_api::get_expense)
                .put(records_api::update_expense)
                .delete(records_api::delete_expense),
        )
        .route_layer(middleware::from_fn_with_state(
            jwt_handler.clone(),
            auth_middleware,
        ))
        .with_state(records_state);

    let public_routes = Router::new().route("/health", get(health_check));

    let app = Router::new()
        .merge(public_routes)
        .merge(auth_router)
        .merge(protected_auth)
        .merge(record_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spendbook_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // Also try the crate-root .env when running from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
