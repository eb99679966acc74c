use anyhow::{Result, anyhow};
use tracing::debug;

use super::ConversationModel;
use crate::model_config::ModelConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAIModel {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIModel {
    pub fn new() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::with_api_key(api_key))
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait::async_trait]
impl ConversationModel for OpenAIModel {
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(system) = &config.system {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system
            }));
        }

        messages.push(serde_json::json!({
            "role": "user",
            "content": prompt
        }));

        let mut request_body = serde_json::json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "messages": messages
        });

        if let Some(temperature) = config.temperature {
            request_body["temperature"] = serde_json::Value::Number(
                serde_json::Number::from_f64(temperature)
                    .unwrap_or_else(|| serde_json::Number::from(0)),
            );
        }

        if let Some(top_p) = config.top_p {
            request_body["top_p"] = serde_json::Value::Number(
                serde_json::Number::from_f64(top_p).unwrap_or_else(|| serde_json::Number::from(0)),
            );
        }

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error: {} - {}", status, error_text));
        }

        let json: serde_json::Value = response.json().await?;
        debug!(model = %config.model, "OpenAI completion received");

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No content in OpenAI response"))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
