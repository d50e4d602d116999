//! Azure OpenAI engine
//!
//! Paths below `/azure` are appended to the resource endpoint, e.g.
//! `/azure/openai/deployments/gpt4/chat/completions`.

use async_trait::async_trait;
use reqwest::header::HeaderName;
use tracing::instrument;
use url::Url;

use crate::{
    config::Config,
    envelope::{RequestEnvelope, ResponseEnvelope},
    error::{AppError, AppResult},
    proxy::{
        engine::Engine,
        headers::secret_value,
        logging::RequestContext,
        upstream::{self, attach_body, join_url},
    },
    router::ProviderKind,
};

const API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");

/// Azure OpenAI pass-through engine
pub struct AzureEngine {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    api_version: String,
}

impl AzureEngine {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            endpoint: config.azure_endpoint.clone(),
            api_key: config.azure_api_key.clone(),
            api_version: config.azure_api_version.clone(),
        }
    }

    fn credentials(&self) -> AppResult<(&str, &str)> {
        let endpoint = self.endpoint.as_deref().ok_or(AppError::CredentialMissing {
            provider: "azure",
            variable: "AZURE_OPENAI_ENDPOINT",
        })?;
        let api_key = self.api_key.as_deref().ok_or(AppError::CredentialMissing {
            provider: "azure",
            variable: "AZURE_OPENAI_API_KEY",
        })?;
        Ok((endpoint, api_key))
    }

    /// Upstream URL with `api-version` set unless the client chose one
    fn url(&self, endpoint: &str, path: &str, query: Option<&str>) -> AppResult<Url> {
        let mut url = Url::parse(&join_url(endpoint, path, query)).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Invalid Azure endpoint {}: {}", endpoint, e))
        })?;

        if !url.query_pairs().any(|(k, _)| k == "api-version") {
            url.query_pairs_mut().append_pair("api-version", &self.api_version);
        }

        Ok(url)
    }
}

#[async_trait]
impl Engine for AzureEngine {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.api_key.is_some()
    }

    #[instrument(skip_all, fields(endpoint = %envelope.endpoint))]
    async fn dispatch(
        &self,
        envelope: &RequestEnvelope,
        ctx: &RequestContext,
    ) -> AppResult<ResponseEnvelope> {
        let (endpoint, api_key) = self.credentials()?;
        let url = self.url(endpoint, &envelope.endpoint, envelope.query.as_deref())?;
        ctx.log_upstream_request(url.as_str(), Some(envelope.body.len()));

        let mut headers = envelope.headers.clone();
        headers.insert(API_KEY_HEADER, secret_value(api_key)?);

        let request = attach_body(
            self.client
                .request(envelope.method.clone(), url.clone())
                .headers(headers),
            envelope,
        );

        let response = upstream::send(self.name(), request, url.as_str(), ctx).await?;
        upstream::relay(self.name(), response, envelope.stream).await
    }
}
