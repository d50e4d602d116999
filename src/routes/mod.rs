//! HTTP routes for llm-relay
//!
//! Fixed service routes plus a fallback that proxies every other path to
//! the provider engine chosen by its prefix.

pub mod health;
pub mod metrics;
pub mod proxy;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Largest request body accepted for proxying
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Relay router: index and health routes, everything else goes to the proxy fallback
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .fallback(proxy::proxy_handler)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Service index
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub providers: Vec<ProviderRoute>,
}

#[derive(Debug, Serialize)]
pub struct ProviderRoute {
    pub prefix: String,
    pub provider: &'static str,
}

pub async fn index(State(state): State<Arc<AppState>>) -> Json<IndexResponse> {
    Json(IndexResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        providers: state
            .routes
            .bindings()
            .iter()
            .map(|b| ProviderRoute {
                prefix: b.prefix.clone(),
                provider: b.kind.as_str(),
            })
            .collect(),
    })
}
