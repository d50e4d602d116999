//! llm-relay - Reverse proxy for LLM provider APIs
//!
//! Requests are routed by path prefix to an OpenAI, Azure OpenAI, Bedrock,
//! Vertex AI or OpenAI-compatible redirect engine. Server-sent event
//! responses are relayed chunk by chunk, every request passes through the
//! audit hook pipeline, and per-request metrics are exported for Prometheus.

pub mod config;
pub mod envelope;
pub mod error;
pub mod hooks;
pub mod proxy;
pub mod router;
pub mod routes;
pub mod streaming;
pub mod telemetry;

use std::time::{Duration, Instant};

use anyhow::Result;

pub use crate::config::Config;
pub use crate::envelope::{Outcome, RequestEnvelope, ResponseEnvelope};
pub use crate::error::{AppError, AppResult};
pub use crate::hooks::{AuditHook, AuditRecord, HookPipeline};
pub use crate::proxy::{Engine, EngineSet, EngineStatus};
pub use crate::router::{ProviderKind, RouteTable};
pub use crate::telemetry::Telemetry;

/// Upper bound for establishing an upstream connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub start_time: Instant,
    /// Prefix bindings
    pub routes: RouteTable,
    /// One engine per provider kind
    pub engines: EngineSet,
    pub hooks: HookPipeline,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self> {
        // Pooled client shared by every engine. The upstream timeout bounds
        // each read, not the whole exchange, so long streams keep flowing.
        let idle_timeout = Duration::from_secs(config.upstream_timeout_seconds);
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .connect_timeout(CONNECT_TIMEOUT.min(idle_timeout))
            .read_timeout(idle_timeout)
            .build()?;

        let engines = EngineSet::new(http_client.clone(), &config);
        let hooks = HookPipeline::from_config(&config);

        Ok(Self {
            config,
            http_client,
            start_time: Instant::now(),
            routes: RouteTable::with_defaults(),
            engines,
            hooks,
        })
    }

    /// Replace the hook pipeline
    pub fn with_hooks(mut self, hooks: HookPipeline) -> Self {
        self.hooks = hooks;
        self
    }
}
