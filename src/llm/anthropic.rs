use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::provider::LlmProvider;
use super::types::{MessageRequest, MessageResponse};
use crate::core::config::AnthropicSettings;
use crate::core::errors::ApiError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

impl AnthropicProvider {
    pub fn new(settings: &AnthropicSettings) -> Result<Self, ApiError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ApiError::BadRequest(
                    "Anthropic API key is not configured (set ANTHROPIC_API_KEY)".to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn create_message(&self, request: MessageRequest) -> Result<MessageResponse, ApiError> {
        let url = format!("{}/v1/messages", self.base_url);

        let res = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::ServiceUnavailable(format!("Anthropic API unreachable: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|env| format!("{}: {}", env.error.kind, env.error.message))
                .unwrap_or(text);
            return Err(ApiError::Upstream(format!(
                "Anthropic API error ({}): {}",
                status, detail
            )));
        }

        let response: MessageResponse = res.json().await.map_err(ApiError::upstream)?;
        tracing::debug!(
            "Anthropic response {} stop_reason={:?} input_tokens={} output_tokens={}",
            response.id,
            response.stop_reason,
            response.usage.input_tokens,
            response.usage.output_tokens
        );
        Ok(response)
    }
}
