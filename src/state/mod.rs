use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::documents::DocumentProcessor;
use crate::embed::create_embedder;
use crate::history::SessionManager;
use crate::llm::{AiGenerator, AnthropicProvider, GeneratorOptions, LlmProvider};
use crate::rag::{RagSystem, SqliteVectorStore, StoreOptions};

pub mod error;

use error::InitializationError;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<Settings>,
    pub rag: Arc<RagSystem>,
}

impl AppState {
    /// Loads typed settings through the config layer.
    pub fn load_settings(config: &ConfigService) -> Result<Settings, InitializationError> {
        config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))
    }

    /// Opens the databases and builds the embedder, LLM provider and RAG system.
    pub async fn initialize(
        paths: Arc<AppPaths>,
        settings: Settings,
    ) -> Result<Arc<Self>, InitializationError> {
        let provider: Arc<dyn LlmProvider> = Arc::new(
            AnthropicProvider::new(&settings.anthropic)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );
        Self::initialize_with_provider(paths, settings, provider).await
    }

    /// Same as [`AppState::initialize`] with a caller-supplied LLM provider.
    pub async fn initialize_with_provider(
        paths: Arc<AppPaths>,
        settings: Settings,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Arc<Self>, InitializationError> {
        if let Some(parent) = paths.db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| InitializationError::Sessions(e.into()))?;
        }

        let sessions = SessionManager::new(paths.db_path.clone(), settings.rag.max_history)
            .await
            .map_err(|e| InitializationError::Sessions(e.into()))?;

        let embedder = create_embedder(&settings.embedding)
            .map_err(|e| InitializationError::Embedder(e.into()))?;

        let store = SqliteVectorStore::open(
            paths.vector_db_path.clone(),
            embedder,
            StoreOptions::from_settings(&settings.rag, settings.embedding.batch_size),
        )
        .await
        .map_err(|e| InitializationError::VectorStore(e.into()))?;

        tracing::info!(
            "Using LLM provider '{}' with model {}",
            provider.name(),
            settings.anthropic.model
        );
        let generator = AiGenerator::new(
            provider,
            GeneratorOptions::from_settings(&settings.anthropic, &settings.rag),
        );

        let rag = RagSystem::new(
            DocumentProcessor::new(settings.rag.chunk_size, settings.rag.chunk_overlap),
            Arc::new(store),
            generator,
            sessions,
        );

        Ok(Arc::new(AppState {
            paths,
            settings: Arc::new(settings),
            rag: Arc::new(rag),
        }))
    }
}
