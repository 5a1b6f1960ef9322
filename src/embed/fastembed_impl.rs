//! In-process sentence-transformer embeddings via fastembed.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

use super::Embedder;
use crate::core::config::EmbeddingSettings;
use crate::core::errors::ApiError;

pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, ApiError> {
        tracing::info!("Initializing FastEmbed with model: {}", settings.model);

        let (model_enum, dimension) = match settings.model.as_str() {
            "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                (EmbeddingModel::AllMiniLML6V2, 384)
            }
            "BAAI/bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "BAAI/bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            other => {
                return Err(ApiError::BadRequest(format!(
                    "Unsupported fastembed model '{}'",
                    other
                )))
            }
        };

        if dimension != settings.dimension {
            return Err(ApiError::BadRequest(format!(
                "embedding.dimension is {} but model '{}' produces {}",
                settings.dimension, settings.model, dimension
            )));
        }

        let options = InitOptions::new(model_enum).with_show_download_progress(true);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| ApiError::Internal(format!("Failed to initialize model: {}", e)))?;

        tracing::info!("FastEmbed model loaded");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: settings.model.clone(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model.embed(texts, None)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Embedding task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(format!("Embedding failed: {}", e)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
