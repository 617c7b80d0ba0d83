pub mod client;
pub mod factory;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use driftbot_core::types::{ChatMessage, LLMResponse};
use driftbot_core::Result;
use serde_json::Value;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse>;
}

pub use factory::{create_default_provider, create_provider, infer_provider_from_model};
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
