use super::handlers::{handle_analyze, handle_health, handle_provider_health, handle_reload};
use super::{AppState, REQUEST_TIMEOUT_SECS};

use crate::config::Config;
use crate::engine::AnalysisEngine;
use crate::persistence::{ProblemStore, SqliteProblemStore};
use crate::providers::{HealthTracker, ProviderRegistry};
use anyhow::{Context, Result};
use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Bind `[gateway] host:port` and serve until the process stops.
pub async fn run_gateway(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .context("parse gateway bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind gateway socket")?;

    run_gateway_with_listener(listener, config).await
}

/// Run the HTTP gateway from a pre-bound listener.
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    config: Config,
) -> Result<()> {
    let local_addr = listener.local_addr()?;

    let database = config.database_path();
    let store: Arc<dyn ProblemStore> = Arc::new(
        SqliteProblemStore::open(&database)
            .await
            .with_context(|| format!("open problem store at {}", database.display()))?,
    );
    let registry = Arc::new(ProviderRegistry::from_config(&config));
    let health = Arc::new(HealthTracker::new());
    let engine = AnalysisEngine::new(Arc::clone(&registry), health, &config)
        .with_store(Arc::clone(&store));

    if registry.is_empty() {
        tracing::warn!("no providers configured; every analysis will be rejected");
    }
    tracing::info!(
        addr = %local_addr,
        providers = registry.len(),
        database = %database.display(),
        "gateway listening"
    );

    let state = AppState {
        engine: Arc::new(engine),
        store: Some(store),
        config_path: config.config_path.clone(),
    };
    let app = build_app(state, &config.gateway.cors_origins, config.gateway.max_body_bytes);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down gateway");
        })
        .await?;

    Ok(())
}

pub fn build_app(state: AppState, cors_origins: &[String], max_body_bytes: usize) -> Router {
    let mut app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/problems/{id}/analyze", post(handle_analyze))
        .route("/api/providers/health", get(handle_provider_health))
        .route("/api/providers/reload", post(handle_reload))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ));

    if !cors_origins.is_empty() {
        let origins: Vec<_> = cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        );
    }

    app
}
