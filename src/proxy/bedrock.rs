//! AWS Bedrock engine
//!
//! Paths below `/bedrock` are forwarded to the Bedrock runtime
//! (`model/{id}/invoke`, `model/{id}/converse`, ...) with a SigV4 signature
//! computed over the exact bytes and path sent. The OpenAI-compatible
//! engine uses `converse` and `converse-stream` directly.

use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::{
    config::Config,
    envelope::{ByteStream, RequestEnvelope, ResponseEnvelope},
    error::{AppError, AppResult},
    proxy::{
        engine::Engine,
        logging::RequestContext,
        sigv4::{encode_path_segment, SigV4Signer},
        upstream::{self, join_url},
    },
    router::ProviderKind,
};

const SIGNING_SERVICE: &str = "bedrock";
const EVENT_STREAM: &str = "application/vnd.amazon.eventstream";

/// `model/{id}/{operation}` with the id encoded as the AWS SDKs send it
fn model_path(model_id: &str, operation: &str) -> String {
    format!("model/{}/{}", encode_path_segment(model_id), operation)
}

/// Bedrock runtime engine
pub struct BedrockEngine {
    client: reqwest::Client,
    base_url: String,
    signer: Option<SigV4Signer>,
    missing: Option<&'static str>,
}

impl BedrockEngine {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        let base_url = config.bedrock_endpoint.clone().unwrap_or_else(|| {
            format!("https://bedrock-runtime.{}.amazonaws.com", config.aws_region)
        });

        let (signer, missing) = match (&config.aws_access_key_id, &config.aws_secret_access_key) {
            (Some(access_key), Some(secret_key)) => (
                Some(SigV4Signer::new(
                    access_key.clone(),
                    secret_key.clone(),
                    config.aws_session_token.clone(),
                    config.aws_region.clone(),
                    SIGNING_SERVICE,
                )),
                None,
            ),
            (None, _) => (None, Some("AWS_ACCESS_KEY_ID")),
            (Some(_), None) => (None, Some("AWS_SECRET_ACCESS_KEY")),
        };

        Self {
            client,
            base_url,
            signer,
            missing,
        }
    }

    fn signer(&self) -> AppResult<&SigV4Signer> {
        self.signer.as_ref().ok_or(AppError::CredentialMissing {
            provider: "bedrock",
            variable: self.missing.unwrap_or("AWS_ACCESS_KEY_ID"),
        })
    }

    fn url(&self, path: &str, query: Option<&str>) -> AppResult<Url> {
        Url::parse(&join_url(&self.base_url, path, query)).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Invalid Bedrock URL for {}: {}", path, e))
        })
    }

    /// Build and send a signed request
    async fn send_signed(
        &self,
        method: Method,
        url: Url,
        headers: reqwest::header::HeaderMap,
        body: Bytes,
        ctx: &RequestContext,
    ) -> AppResult<reqwest::Response> {
        let signer = self.signer()?;
        let signature = signer.sign(&method, &url, &body, Utc::now())?;
        ctx.log_upstream_request(url.as_str(), Some(body.len()));

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers)
            .headers(signature);
        if method != Method::GET && method != Method::HEAD {
            request = request.body(body);
        }

        upstream::send(self.name(), request, url.as_str(), ctx).await
    }

    async fn send_converse(
        &self,
        model_id: &str,
        operation: &str,
        accept: &'static str,
        body: &Value,
        ctx: &RequestContext,
    ) -> AppResult<reqwest::Response> {
        self.signer()?;
        let url = self.url(&model_path(model_id, operation), None)?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static(accept));

        let body = Bytes::from(serde_json::to_vec(body)?);
        self.send_signed(Method::POST, url, headers, body, ctx).await
    }

    /// Call the Converse API for `model_id` and return its JSON reply
    pub async fn converse(
        &self,
        model_id: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> AppResult<Value> {
        let response = self
            .send_converse(model_id, "converse", "application/json", body, ctx)
            .await?;
        upstream::read_json(self.name(), response).await
    }

    /// Call `converse-stream` and return its event-stream body as it arrives
    pub async fn converse_stream(
        &self,
        model_id: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> AppResult<ByteStream> {
        let response = self
            .send_converse(model_id, "converse-stream", EVENT_STREAM, body, ctx)
            .await?;
        let response = upstream::ensure_success(self.name(), response).await?;
        Ok(upstream::byte_stream(self.name(), response))
    }
}

#[async_trait]
impl Engine for BedrockEngine {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bedrock
    }

    fn is_configured(&self) -> bool {
        self.signer.is_some()
    }

    #[instrument(skip_all, fields(endpoint = %envelope.endpoint))]
    async fn dispatch(
        &self,
        envelope: &RequestEnvelope,
        ctx: &RequestContext,
    ) -> AppResult<ResponseEnvelope> {
        self.signer()?;
        let url = self.url(&envelope.endpoint, envelope.query.as_deref())?;

        let response = self
            .send_signed(
                envelope.method.clone(),
                url,
                envelope.headers.clone(),
                envelope.body.clone(),
                ctx,
            )
            .await?;
        upstream::relay(self.name(), response, envelope.stream).await
    }
}
