use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub mod openai_api;
pub mod prompts;
pub mod response;

pub use openai_api::OpenAiProvider;
pub use response::{Classification, ResponseParser};

use crate::config::LlmConfig;

/// One completion request. Providers are expected to answer with JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the raw text of the model's answer.
    async fn complete(&self, request: &LlmRequest) -> Result<String>;
}

/// Stands in when no provider is configured; every call fails, and the
/// failure surfaces through the normal analysis error path.
pub struct DisabledProvider;

#[async_trait]
impl LlmProvider for DisabledProvider {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn complete(&self, _request: &LlmRequest) -> Result<String> {
        anyhow::bail!("LLM provider not configured")
    }
}

pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    match config.provider.as_str() {
        "openai-api" | "openai" => {
            let Some(api_key) = config.resolved_api_key() else {
                warn!("No LLM API key configured; analysis requests will fail");
                return Ok(Arc::new(DisabledProvider));
            };
            let provider = OpenAiProvider::new(
                config.api_endpoint.clone(),
                api_key,
                config.model.clone(),
                config.timeout(),
            )?;
            Ok(Arc::new(provider))
        }
        "disabled" | "none" => {
            info!("LLM provider disabled by config");
            Ok(Arc::new(DisabledProvider))
        }
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    }
}
