//! Provider engine abstraction
//!
//! Every URL prefix is served by one `Engine`. Engines share the pooled
//! HTTP client and read their credentials from `Config`.
//!
//! # Security
//!
//! Implementations never forward client `Authorization` headers upstream;
//! only the whitelist kept in `RequestEnvelope::headers` crosses the relay,
//! and each engine adds its own provider credential.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    config::Config,
    envelope::{RequestEnvelope, ResponseEnvelope},
    error::AppResult,
    proxy::{
        logging::RequestContext, AzureEngine, BedrockEngine, OpenAIEngine, OpenAIProxyEngine,
        VertexEngine,
    },
    router::ProviderKind,
};

/// A provider backend reachable through the relay
#[async_trait]
pub trait Engine: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Name used for logging and metrics
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Whether the credentials this engine needs are present
    fn is_configured(&self) -> bool;

    /// Forward one request and return the provider's reply
    async fn dispatch(
        &self,
        envelope: &RequestEnvelope,
        ctx: &RequestContext,
    ) -> AppResult<ResponseEnvelope>;
}

/// Configuration state reported by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub provider: &'static str,
    pub configured: bool,
}

/// One engine per provider kind
#[derive(Clone)]
pub struct EngineSet {
    openai: Arc<OpenAIEngine>,
    azure: Arc<AzureEngine>,
    bedrock: Arc<BedrockEngine>,
    vertex: Arc<VertexEngine>,
    openai_proxy: Arc<OpenAIProxyEngine>,
}

impl EngineSet {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        let openai = Arc::new(OpenAIEngine::new(client.clone(), config));
        let azure = Arc::new(AzureEngine::new(client.clone(), config));
        let bedrock = Arc::new(BedrockEngine::new(client.clone(), config));
        let vertex = Arc::new(VertexEngine::new(client, config));
        let openai_proxy = Arc::new(OpenAIProxyEngine::new(
            openai.clone(),
            azure.clone(),
            bedrock.clone(),
            vertex.clone(),
        ));

        Self {
            openai,
            azure,
            bedrock,
            vertex,
            openai_proxy,
        }
    }

    pub fn get(&self, kind: ProviderKind) -> Arc<dyn Engine> {
        match kind {
            ProviderKind::OpenAI => self.openai.clone(),
            ProviderKind::Azure => self.azure.clone(),
            ProviderKind::Bedrock => self.bedrock.clone(),
            ProviderKind::Vertex => self.vertex.clone(),
            ProviderKind::OpenAIProxy => self.openai_proxy.clone(),
        }
    }

    pub fn statuses(&self) -> Vec<EngineStatus> {
        [
            ProviderKind::OpenAI,
            ProviderKind::Azure,
            ProviderKind::Bedrock,
            ProviderKind::Vertex,
            ProviderKind::OpenAIProxy,
        ]
        .into_iter()
        .map(|kind| {
            let engine = self.get(kind);
            EngineStatus {
                provider: engine.name(),
                configured: engine.is_configured(),
            }
        })
        .collect()
    }
}
