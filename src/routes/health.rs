//! `/health` and `/health/live`
//!
//! Neither endpoint runs audit hooks or touches an upstream.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{proxy::EngineStatus, AppState};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Up, but no provider has credentials so every relay would fail
    Degraded,
}

impl HealthStatus {
    fn from_providers(providers: &[EngineStatus]) -> Self {
        if providers.iter().any(|p| p.configured) {
            Self::Healthy
        } else {
            Self::Degraded
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub telemetry: bool,
    pub providers: Vec<EngineStatus>,
}

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub status: HealthStatus,
}

/// Relay status with one entry per provider engine
///
/// Always answers 200; a degraded relay is still able to serve `/health`.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let providers = state.engines.statuses();

    Json(HealthReport {
        status: HealthStatus::from_providers(&providers),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        telemetry: state.config.enable_telemetry,
        providers,
    })
}

pub async fn liveness_check() -> Json<Liveness> {
    Json(Liveness {
        status: HealthStatus::Healthy,
    })
}
