//! Prefix-based provider routing
//!
//! Maps the leading path segment(s) of an inbound request to the provider
//! binding that serves it.

use std::fmt;

use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Provider engines known to the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    OpenAI,
    Azure,
    Bedrock,
    Vertex,
    OpenAIProxy,
}

impl ProviderKind {
    /// Label used in logs, metrics and audit records
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Bedrock => "bedrock",
            ProviderKind::Vertex => "vertex",
            ProviderKind::OpenAIProxy => "openai-proxy",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a URL prefix to a provider engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderBinding {
    pub prefix: String,
    pub kind: ProviderKind,
}

impl ProviderBinding {
    pub fn new(prefix: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            prefix: prefix.into(),
            kind,
        }
    }

    /// Segment-boundary match: `/openai` matches `/openai` and `/openai/x`
    /// but not `/openai-proxy/x`.
    fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Result of resolving a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub kind: ProviderKind,
    pub prefix: String,
    /// Remainder of the path after the prefix, without a leading slash
    pub endpoint: String,
}

/// Immutable table of provider bindings
#[derive(Debug, Clone)]
pub struct RouteTable {
    bindings: Vec<ProviderBinding>,
}

impl RouteTable {
    /// Build a table, rejecting malformed or duplicate prefixes
    pub fn new(bindings: Vec<ProviderBinding>) -> AppResult<Self> {
        for (i, binding) in bindings.iter().enumerate() {
            if !binding.prefix.starts_with('/') || binding.prefix.len() < 2 {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Route prefix must be a non-root absolute path: {:?}",
                    binding.prefix
                )));
            }
            if binding.prefix.ends_with('/') {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Route prefix must not end with '/': {:?}",
                    binding.prefix
                )));
            }
            if bindings[..i].iter().any(|b| b.prefix == binding.prefix) {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Duplicate route prefix: {}",
                    binding.prefix
                )));
            }
        }

        Ok(Self { bindings })
    }

    /// The five documented provider prefixes
    pub fn with_defaults() -> Self {
        Self {
            bindings: vec![
                ProviderBinding::new("/openai", ProviderKind::OpenAI),
                ProviderBinding::new("/azure", ProviderKind::Azure),
                ProviderBinding::new("/bedrock", ProviderKind::Bedrock),
                ProviderBinding::new("/vertex", ProviderKind::Vertex),
                ProviderBinding::new("/openai-proxy", ProviderKind::OpenAIProxy),
            ],
        }
    }

    pub fn bindings(&self) -> &[ProviderBinding] {
        &self.bindings
    }

    /// Select the binding with the longest prefix matching `path`
    pub fn resolve(&self, path: &str) -> AppResult<RouteMatch> {
        let binding = self
            .bindings
            .iter()
            .filter(|b| b.matches(path))
            .max_by_key(|b| b.prefix.len())
            .ok_or_else(|| AppError::NoMatchingRoute(path.to_string()))?;

        let endpoint = path[binding.prefix.len()..].trim_start_matches('/');

        Ok(RouteMatch {
            kind: binding.kind,
            prefix: binding.prefix.clone(),
            endpoint: endpoint.to_string(),
        })
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
