//! HTTP API gateway for braid.
//!
//! Exposes the chat endpoint and the session / branch / summary REST
//! surface on top of the context assembly core.
//!
//! Built on Axum for high performance async HTTP.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use braid_core::provider::Provider;
use braid_core::store::ChatStore;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application state for the gateway.
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub provider: Arc<dyn Provider>,
    pub config: braid_config::AppConfig,
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api::api_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: braid_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let store = braid_store::SqliteStore::new(&config.storage.database_path).await?;
    let provider = braid_providers::OpenAiCompatProvider::new(
        "openai",
        &config.base_url,
        config.api_key.clone().unwrap_or_default(),
    );

    let state = Arc::new(AppState {
        store: Arc::new(store),
        provider: Arc::new(provider),
        config,
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use braid_providers::ScriptedProvider;
    use braid_store::InMemoryStore;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        Arc::new(AppState {
            store: Arc::new(InMemoryStore::new()),
            provider: Arc::new(ScriptedProvider::new()),
            config: braid_config::AppConfig::default(),
        })
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state());

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
