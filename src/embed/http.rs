use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::core::config::EmbeddingSettings;
use crate::core::errors::ApiError;

/// Client for OpenAI-compatible `/v1/embeddings` servers
/// (llama.cpp, LM Studio, text-embeddings-inference, ...).
pub struct HttpEmbedder {
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    client: Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl HttpEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|key| !key.trim().is_empty()),
            model: settings.model.clone(),
            dimension: settings.dimension,
            client,
        })
    }

    fn validate_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<(), ApiError> {
        if let Some(mismatch) = embeddings.iter().find(|vec| vec.len() != self.dimension) {
            return Err(ApiError::Upstream(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model,
                self.dimension,
                mismatch.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: &texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(|e| {
            ApiError::ServiceUnavailable(format!("Embedding server unreachable at {}: {}", url, e))
        })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "Embedding request failed ({}): {}",
                status, text
            )));
        }

        let mut payload: EmbeddingResponse = res.json().await.map_err(ApiError::upstream)?;
        if payload.data.len() != texts.len() {
            return Err(ApiError::Upstream(format!(
                "Embedding server returned {} vectors for {} inputs",
                payload.data.len(),
                texts.len()
            )));
        }

        payload.data.sort_by_key(|item| item.index.unwrap_or(usize::MAX));
        let embeddings: Vec<Vec<f32>> = payload.data.into_iter().map(|item| item.embedding).collect();
        self.validate_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
