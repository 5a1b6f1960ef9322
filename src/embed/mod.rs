//! Text embedding backends.
//!
//! All backends implement [`Embedder`]; [`create_embedder`] picks one from
//! the `embedding` config section.

mod hashing;
mod http;
#[cfg(feature = "local-embed")]
mod fastembed_impl;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;
#[cfg(feature = "local-embed")]
pub use fastembed_impl::FastEmbedder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::{EmbeddingProvider, EmbeddingSettings};
use crate::core::errors::ApiError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in the same order.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ApiError>;

    fn dimension(&self) -> usize;

    /// Identifier persisted alongside stored vectors.
    fn model_name(&self) -> &str;
}

pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, ApiError> {
    match settings.provider {
        EmbeddingProvider::Http => Ok(Arc::new(HttpEmbedder::new(settings)?)),
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimension))),
        #[cfg(feature = "local-embed")]
        EmbeddingProvider::Fastembed => Ok(Arc::new(FastEmbedder::new(settings)?)),
        #[cfg(not(feature = "local-embed"))]
        EmbeddingProvider::Fastembed => Err(ApiError::BadRequest(
            "embedding.provider 'fastembed' requires building with the 'local-embed' feature"
                .to_string(),
        )),
    }
}

/// Embeds a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, ApiError> {
    embedder
        .embed(vec![text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal("Embedder returned no vector".to_string()))
}

/// Embeds `texts` in slices of `batch_size`, preserving order.
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, ApiError> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let embeddings = embedder.embed(chunk.to_vec()).await?;
        if embeddings.len() != chunk.len() {
            return Err(ApiError::Internal(format!(
                "Embedder returned {} vectors for {} inputs",
                embeddings.len(),
                chunk.len()
            )));
        }
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}
