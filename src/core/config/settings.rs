use serde::{Deserialize, Serialize};

/// Typed view over the merged `config.yml` + `secrets.yaml` document.
///
/// Every field has a default so a missing or partial file still yields a
/// usable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub anthropic: AnthropicSettings,
    pub embedding: EmbeddingSettings,
    pub rag: RagSettings,
    pub documents: DocumentSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 800,
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    Http,
    /// Deterministic hashed bag-of-words vectors; no model required.
    Hashing,
    /// In-process ONNX model (requires the `local-embed` feature).
    Fastembed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Http,
            model: "all-MiniLM-L6-v2".to_string(),
            base_url: "http://127.0.0.1:8090".to_string(),
            api_key: None,
            dimension: 384,
            batch_size: 32,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters of trailing sentences repeated at the start of the next chunk.
    pub chunk_overlap: usize,
    /// Default number of hits returned by a content search.
    pub max_results: usize,
    /// Number of user/assistant exchanges remembered per session.
    pub max_history: usize,
    /// Upper bound on sequential tool-calling rounds per query.
    pub max_tool_rounds: usize,
    /// Minimum cosine score for fuzzy course-name resolution.
    pub course_match_threshold: f32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            max_results: 5,
            max_history: 2,
            max_tool_rounds: 2,
            course_match_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub path: String,
    pub load_on_startup: bool,
    pub clear_existing: bool,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            path: "docs".to_string(),
            load_on_startup: true,
            clear_existing: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Empty means any origin is allowed.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub filter: Option<String>,
}
