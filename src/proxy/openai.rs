//! OpenAI engine
//!
//! Forwards requests under `/openai` to the OpenAI API unchanged, replacing
//! client credentials with the relay's own API key.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use tracing::instrument;

use crate::{
    config::Config,
    envelope::{RequestEnvelope, ResponseEnvelope},
    error::{AppError, AppResult},
    proxy::{
        engine::Engine,
        headers::bearer_value,
        logging::RequestContext,
        upstream::{self, attach_body, join_url},
    },
    router::ProviderKind,
};

/// OpenAI pass-through engine
pub struct OpenAIEngine {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAIEngine {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.openai_api_url.clone(),
            api_key: config.openai_api_key.clone(),
        }
    }

    fn api_key(&self) -> AppResult<&str> {
        self.api_key.as_deref().ok_or(AppError::CredentialMissing {
            provider: "openai",
            variable: "OPENAI_API_KEY",
        })
    }
}

#[async_trait]
impl Engine for OpenAIEngine {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip_all, fields(endpoint = %envelope.endpoint))]
    async fn dispatch(
        &self,
        envelope: &RequestEnvelope,
        ctx: &RequestContext,
    ) -> AppResult<ResponseEnvelope> {
        let api_key = self.api_key()?;
        let url = join_url(&self.base_url, &envelope.endpoint, envelope.query.as_deref());
        ctx.log_upstream_request(&url, Some(envelope.body.len()));

        let mut headers = envelope.headers.clone();
        headers.insert(AUTHORIZATION, bearer_value(api_key)?);

        let request = attach_body(
            self.client.request(envelope.method.clone(), &url).headers(headers),
            envelope,
        );

        let response = upstream::send(self.name(), request, &url, ctx).await?;
        upstream::relay(self.name(), response, envelope.stream).await
    }
}
