pub mod anthropic;
pub mod openai;

use anyhow::Result;
use std::sync::Arc;

use crate::model_config::ModelConfig;

#[async_trait::async_trait]
pub trait ConversationModel: Send + Sync {
    /// Sends one chat-style completion and returns the generated text.
    ///
    /// Implementations fail on non-2xx responses and on payloads without text,
    /// so callers can treat any `Err` as "provider unavailable".
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String>;

    fn provider_name(&self) -> &'static str;
}

pub fn create_model(provider: &str) -> Result<Arc<dyn ConversationModel>> {
    match provider {
        "anthropic" => Ok(Arc::new(anthropic::AnthropicModel::new()?)),
        "openai" => Ok(Arc::new(openai::OpenAIModel::new()?)),
        _ => Err(anyhow::anyhow!("Unsupported provider: {}", provider)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_rejected() {
        let err = create_model("llama-farm").err().unwrap();
        assert!(err.to_string().contains("Unsupported provider"));
    }
}
