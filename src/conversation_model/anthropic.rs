use anyhow::{Result, anyhow};
use tracing::debug;

use super::ConversationModel;
use crate::model_config::ModelConfig;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

pub struct AnthropicModel {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicModel {
    pub fn new() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
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
impl ConversationModel for AnthropicModel {
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String> {
        let mut request_body = serde_json::json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });

        if let Some(system) = &config.system {
            request_body["system"] = serde_json::Value::String(system.clone());
        }

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
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error: {} - {}", status, error_text));
        }

        let json: serde_json::Value = response.json().await?;
        debug!(model = %config.model, "Anthropic completion received");

        let text = json["content"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item["type"] == "text")
                    .filter_map(|item| item["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            Err(anyhow!("No valid content found in response"))
        } else {
            Ok(text.trim().to_string())
        }
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}
