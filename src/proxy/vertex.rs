//! Google Vertex AI engine

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::instrument;

use crate::{
    config::Config,
    envelope::{ByteStream, RequestEnvelope, ResponseEnvelope},
    error::{AppError, AppResult},
    proxy::{
        engine::Engine,
        headers::bearer_value,
        logging::RequestContext,
        upstream::{self, attach_body, join_url},
    },
    router::ProviderKind,
};

/// Vertex AI pass-through engine
///
/// Paths below `/vertex` are relative to
/// `projects/{project}/locations/{location}`, e.g.
/// `/vertex/publishers/google/models/gemini-1.5-pro:generateContent`.
pub struct VertexEngine {
    client: reqwest::Client,
    project: Option<String>,
    location: String,
    access_token: Option<String>,
    endpoint: Option<String>,
}

impl VertexEngine {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            project: config.vertex_project.clone(),
            location: config.vertex_location.clone(),
            access_token: config.vertex_access_token.clone(),
            endpoint: config.vertex_endpoint.clone(),
        }
    }

    /// Base URL for project-scoped resources
    fn base_url(&self) -> AppResult<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }

        let project = self.project.as_deref().ok_or(AppError::CredentialMissing {
            provider: "vertex",
            variable: "GOOGLE_CLOUD_PROJECT",
        })?;
        Ok(format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}",
            loc = self.location,
            project = project
        ))
    }

    fn access_token(&self) -> AppResult<&str> {
        self.access_token
            .as_deref()
            .ok_or(AppError::CredentialMissing {
                provider: "vertex",
                variable: "VERTEX_ACCESS_TOKEN",
            })
    }

    fn auth_headers(&self) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer_value(self.access_token()?)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post_model(
        &self,
        model: &str,
        method: &str,
        query: Option<&str>,
        body: &Value,
        ctx: &RequestContext,
    ) -> AppResult<reqwest::Response> {
        let headers = self.auth_headers()?;
        let path = format!("publishers/google/models/{}:{}", model, method);
        let url = join_url(&self.base_url()?, &path, query);

        let body = Bytes::from(serde_json::to_vec(body)?);
        ctx.log_upstream_request(&url, Some(body.len()));

        let request = self.client.post(&url).headers(headers).body(body);
        upstream::send(self.name(), request, &url, ctx).await
    }

    /// Call `generateContent` and return the JSON reply
    pub async fn generate_content(
        &self,
        model: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> AppResult<Value> {
        let response = self
            .post_model(model, "generateContent", None, body, ctx)
            .await?;
        upstream::read_json(self.name(), response).await
    }

    /// Call `streamGenerateContent` with SSE framing and return the raw event stream
    pub async fn stream_generate_content(
        &self,
        model: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> AppResult<ByteStream> {
        let response = self
            .post_model(model, "streamGenerateContent", Some("alt=sse"), body, ctx)
            .await?;
        let response = upstream::ensure_success(self.name(), response).await?;
        Ok(upstream::byte_stream(self.name(), response))
    }
}

#[async_trait]
impl Engine for VertexEngine {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Vertex
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some() && (self.project.is_some() || self.endpoint.is_some())
    }

    #[instrument(skip_all, fields(endpoint = %envelope.endpoint))]
    async fn dispatch(
        &self,
        envelope: &RequestEnvelope,
        ctx: &RequestContext,
    ) -> AppResult<ResponseEnvelope> {
        let token = self.access_token()?;
        let url = join_url(&self.base_url()?, &envelope.endpoint, envelope.query.as_deref());
        ctx.log_upstream_request(&url, Some(envelope.body.len()));

        let mut headers = envelope.headers.clone();
        headers.insert(AUTHORIZATION, bearer_value(token)?);

        let request = attach_body(
            self.client.request(envelope.method.clone(), &url).headers(headers),
            envelope,
        );

        let response = upstream::send(self.name(), request, &url, ctx).await?;
        upstream::relay(self.name(), response, envelope.stream).await
    }
}
