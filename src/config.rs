//! Configuration management for llm-relay
//!
//! Configuration is loaded from environment variables. Provider credentials
//! are optional at startup; an engine whose credentials are absent answers
//! with `CredentialMissing` when it is hit.

use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Serve Prometheus metrics
    pub enable_telemetry: bool,
    /// Port of the separate metrics listener
    pub prometheus_port: u16,

    /// OpenAI API URL
    pub openai_api_url: String,
    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// Azure OpenAI resource endpoint (e.g. https://my-resource.openai.azure.com)
    pub azure_endpoint: Option<String>,
    /// Azure OpenAI API key
    pub azure_api_key: Option<String>,
    /// Azure OpenAI `api-version` query parameter
    pub azure_api_version: String,

    /// AWS region for Bedrock
    pub aws_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    /// Overrides the regional Bedrock runtime URL
    pub bedrock_endpoint: Option<String>,

    /// Google Cloud project hosting Vertex AI
    pub vertex_project: Option<String>,
    /// Vertex AI location
    pub vertex_location: String,
    /// OAuth access token for Vertex AI
    pub vertex_access_token: Option<String>,
    /// Overrides the regional Vertex AI URL
    pub vertex_endpoint: Option<String>,

    /// Timeout applied to every upstream request (in seconds)
    pub upstream_timeout_seconds: u64,

    /// Directory for the JSON-lines audit log (disabled when unset)
    pub audit_log_dir: Option<String>,
    /// Maximum number of response bytes kept for audit records
    pub audit_capture_limit_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            host: or("RELAY_HOST", "0.0.0.0"),
            port: or("RELAY_PORT", "5000")
                .parse()
                .context("Invalid RELAY_PORT")?,

            enable_telemetry: var("ENABLE_TELEMETRY")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            prometheus_port: or("PROMETHEUS_PORT", "8081")
                .parse()
                .context("Invalid PROMETHEUS_PORT")?,

            openai_api_url: or("OPENAI_API_URL", "https://api.openai.com/v1"),
            openai_api_key: var("OPENAI_API_KEY"),

            azure_endpoint: var("AZURE_OPENAI_ENDPOINT"),
            azure_api_key: var("AZURE_OPENAI_API_KEY"),
            azure_api_version: or("AZURE_OPENAI_API_VERSION", "2024-06-01"),

            aws_region: or("AWS_REGION", "us-east-1"),
            aws_access_key_id: var("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            aws_session_token: var("AWS_SESSION_TOKEN"),
            bedrock_endpoint: var("BEDROCK_ENDPOINT"),

            vertex_project: var("GOOGLE_CLOUD_PROJECT"),
            vertex_location: or("VERTEX_LOCATION", "us-central1"),
            vertex_access_token: var("VERTEX_ACCESS_TOKEN"),
            vertex_endpoint: var("VERTEX_ENDPOINT"),

            upstream_timeout_seconds: or("UPSTREAM_TIMEOUT_SECONDS", "300")
                .parse()
                .context("Invalid UPSTREAM_TIMEOUT_SECONDS")?,

            audit_log_dir: var("AUDIT_LOG_DIR"),
            audit_capture_limit_bytes: or("AUDIT_CAPTURE_LIMIT_BYTES", "262144")
                .parse()
                .context("Invalid AUDIT_CAPTURE_LIMIT_BYTES")?,
        })
    }
}

/// `false`, `0`, `no` and `off` disable a flag; anything else enables it
fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}
