//! Proxy module
//!
//! Provider engines and the transport they share.

pub mod azure;
pub mod bedrock;
pub mod engine;
pub mod headers;
pub mod logging;
pub mod openai;
pub mod openai_proxy;
pub mod sigv4;
pub mod translate;
pub mod upstream;
pub mod vertex;

pub use azure::AzureEngine;
pub use bedrock::BedrockEngine;
pub use engine::{Engine, EngineSet, EngineStatus};
pub use openai::OpenAIEngine;
pub use openai_proxy::OpenAIProxyEngine;
pub use vertex::VertexEngine;
