//! Layered settings: built-in defaults, an optional `course-rag.toml`
//! (or the file named by `COURSE_RAG_CONFIG`), then `COURSE_RAG__*` env vars.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::rag::indexer::IdStrategy;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub workers: WorkerSettings,
    pub retrieval: RetrievalSettings,
    pub indexing: IndexingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub qdrant_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    pub model: String,
    /// Directory holding `model.onnx` and tokenizer files. Takes precedence over `model`.
    #[serde(default)]
    pub model_dir: Option<String>,
    pub cache_dir: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationProvider {
    Ollama,
    Openai,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSettings {
    pub provider: GenerationProvider,
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSettings {
    pub chat_top_n: u64,
    pub notes_top_n: u64,
    pub search_top_n: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexingSettings {
    pub id_strategy: IdStrategy,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let file = std::env::var("COURSE_RAG_CONFIG").unwrap_or_else(|_| "course-rag".to_string());

        let settings = Self::builder()?
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix("COURSE_RAG")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Defaults only; useful for tests and as the base layer of `load`.
    pub fn defaults() -> Result<Self> {
        let settings = Self::builder()?
            .build()
            .context("Failed to assemble default configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid default configuration")?;
        Ok(settings)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = config::Config::builder()
            .set_default("server.bind", "0.0.0.0:5001")?
            .set_default("store.backend", "qdrant")?
            .set_default("store.qdrant_url", "http://localhost:6334")?
            .set_default("embedding.model", "paraphrase-multilingual-mpnet-base-v2")?
            .set_default("embedding.cache_dir", ".fastembed_cache")?
            .set_default("embedding.timeout_secs", 120)?
            .set_default("generation.provider", "ollama")?
            .set_default("generation.base_url", "http://localhost:11434")?
            .set_default("generation.model", "qwen2.5:7b")?
            .set_default("generation.timeout_secs", 300)?
            .set_default("workers.max_concurrent", 4)?
            .set_default("retrieval.chat_top_n", 5)?
            .set_default("retrieval.notes_top_n", 30)?
            .set_default("retrieval.search_top_n", 5)?
            .set_default("indexing.id_strategy", "content_hash")?;
        Ok(builder)
    }

    fn validate(&self) -> Result<()> {
        if self.workers.max_concurrent == 0 {
            anyhow::bail!("workers.max_concurrent must be at least 1");
        }
        if self.retrieval.chat_top_n == 0
            || self.retrieval.notes_top_n == 0
            || self.retrieval.search_top_n == 0
        {
            anyhow::bail!("retrieval top_n values must be at least 1");
        }
        Ok(())
    }
}
