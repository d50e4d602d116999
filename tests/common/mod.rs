//! Common test utilities for llm-relay
//!
//! Configuration built from an in-memory variable map, a recording audit
//! hook, and a helper that wires both into an `axum_test::TestServer`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;

use llm_relay::{
    routes, AppError, AppResult, AppState, AuditHook, AuditRecord, Config, HookPipeline,
    RequestEnvelope,
};

/// Test configuration constants
pub mod constants {
    pub const TEST_OPENAI_API_KEY: &str = "test-openai-api-key";
    pub const TEST_AZURE_API_KEY: &str = "test-azure-api-key";
    pub const TEST_AWS_ACCESS_KEY_ID: &str = "AKIDEXAMPLE";
    pub const TEST_AWS_SECRET_ACCESS_KEY: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";
    pub const TEST_VERTEX_TOKEN: &str = "test-vertex-token";
    pub const TEST_AZURE_API_VERSION: &str = "2024-06-01";
}

/// Environment for `Config::from_lookup`
#[derive(Debug, Clone, Default)]
pub struct TestEnv {
    vars: HashMap<String, String>,
}

impl TestEnv {
    /// Telemetry off, nothing else configured
    pub fn new() -> Self {
        Self::default().set("ENABLE_TELEMETRY", "false")
    }

    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    pub fn openai(self, uri: &str) -> Self {
        self.set("OPENAI_API_URL", format!("{}/v1", uri))
            .set("OPENAI_API_KEY", constants::TEST_OPENAI_API_KEY)
    }

    pub fn azure(self, uri: &str) -> Self {
        self.set("AZURE_OPENAI_ENDPOINT", uri)
            .set("AZURE_OPENAI_API_KEY", constants::TEST_AZURE_API_KEY)
            .set("AZURE_OPENAI_API_VERSION", constants::TEST_AZURE_API_VERSION)
    }

    pub fn bedrock(self, uri: &str) -> Self {
        self.set("BEDROCK_ENDPOINT", uri)
            .set("AWS_REGION", "us-east-1")
            .set("AWS_ACCESS_KEY_ID", constants::TEST_AWS_ACCESS_KEY_ID)
            .set("AWS_SECRET_ACCESS_KEY", constants::TEST_AWS_SECRET_ACCESS_KEY)
    }

    pub fn vertex(self, uri: &str) -> Self {
        self.set("VERTEX_ENDPOINT", uri)
            .set("VERTEX_ACCESS_TOKEN", constants::TEST_VERTEX_TOKEN)
    }

    pub fn config(&self) -> Config {
        let vars = self.vars.clone();
        Config::from_lookup(move |key| vars.get(key).cloned()).expect("test config is valid")
    }
}

/// Audit hook that keeps everything it sees
#[derive(Default)]
pub struct RecordingHook {
    reject: bool,
    pre: Mutex<Vec<String>>,
    post: Mutex<Vec<AuditRecord>>,
}

impl RecordingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hook whose pre-request callback refuses every request
    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Self::default()
        })
    }

    pub fn pre_requests(&self) -> Vec<String> {
        self.pre.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.post.lock().unwrap().clone()
    }

    /// Poll until `count` post-response records arrived, or two seconds pass
    pub async fn wait_for_records(&self, count: usize) -> Vec<AuditRecord> {
        for _ in 0..200 {
            let records = self.records();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.records()
    }
}

#[async_trait]
impl AuditHook for RecordingHook {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn pre_request(&self, envelope: &RequestEnvelope) -> AppResult<()> {
        self.pre.lock().unwrap().push(envelope.id.clone());
        if self.reject {
            return Err(AppError::HookRejected("request refused by test hook".into()));
        }
        Ok(())
    }

    async fn post_response(&self, record: &AuditRecord) {
        self.post.lock().unwrap().push(record.clone());
    }
}

/// Relay under test with `hook` as its only audit hook
pub fn test_server(config: Config, hook: Arc<RecordingHook>) -> TestServer {
    let state = AppState::new(config)
        .expect("app state builds")
        .with_hooks(HookPipeline::new().with_hook(hook));
    TestServer::new(routes::create_router(Arc::new(state))).expect("test server starts")
}

/// Relay listening on a local port, for tests that drop the connection
pub async fn spawn_relay(config: Config, hook: Arc<RecordingHook>) -> SocketAddr {
    let state = AppState::new(config)
        .expect("app state builds")
        .with_hooks(HookPipeline::new().with_hook(hook));
    let app = routes::create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("relay binds");
    let addr = listener.local_addr().expect("relay address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("relay serves");
    });
    addr
}
