use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, InitOptionsUserDefined, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel,
};

use super::workers::{ModelRegistry, WorkerPool};
use crate::config::EmbeddingSettings;
use crate::error::RagError;

/// Text encoder shared by indexing and querying. Every vector it returns for
/// a given `model_id` has the same dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    async fn embed(&self, texts: Vec<String>) -> crate::error::Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> crate::error::Result<Vec<f32>> {
        self.embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::upstream("embedder", "model returned no vector"))
    }

    /// Load whatever the encoder needs ahead of the first request.
    async fn warm_up(&self) -> crate::error::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum ModelSource {
    Builtin(EmbeddingModel),
    LocalDir(PathBuf),
}

fn builtin_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "paraphrase-multilingual-mpnet-base-v2" => Some(EmbeddingModel::ParaphraseMLMpnetBaseV2),
        "paraphrase-multilingual-minilm-l12-v2" => Some(EmbeddingModel::ParaphraseMLMiniLML12V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "all-minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        _ => None,
    }
}

fn load_user_defined(model_dir: &Path) -> Result<TextEmbedding> {
    tracing::info!("Initializing embedding model from local files...");

    if !model_dir.exists() {
        anyhow::bail!("Model directory not found: {}", model_dir.display());
    }

    let read = |file: &str| {
        std::fs::read(model_dir.join(file)).map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file, e))
    };

    let user_model = UserDefinedEmbeddingModel {
        onnx_file: read("model.onnx")?,
        tokenizer_files: TokenizerFiles {
            tokenizer_file: read("tokenizer.json")?,
            config_file: read("config.json")?,
            special_tokens_map_file: read("special_tokens_map.json")?,
            tokenizer_config_file: read("tokenizer_config.json")?,
        },
    };

    TextEmbedding::try_new_from_user_defined(user_model, InitOptionsUserDefined::default())
        .map_err(|e| anyhow::anyhow!("Failed to initialize embedding model: {}", e))
}

fn load(source: ModelSource, cache_dir: PathBuf) -> Result<TextEmbedding> {
    match source {
        ModelSource::LocalDir(dir) => load_user_defined(&dir),
        ModelSource::Builtin(model) => TextEmbedding::try_new(InitOptions {
            model_name: model,
            cache_dir,
            show_download_progress: true,
            ..Default::default()
        })
        .map_err(|e| anyhow::anyhow!("Failed to initialize embedding model: {}", e)),
    }
}

/// fastembed-backed encoder. The ONNX model is loaded on first use and
/// shared through the registry; encoding runs on the worker pool.
pub struct FastEmbedder {
    model_id: String,
    source: ModelSource,
    cache_dir: PathBuf,
    timeout: Duration,
    registry: Arc<ModelRegistry<TextEmbedding>>,
    pool: WorkerPool,
}

impl FastEmbedder {
    pub fn new(
        settings: &EmbeddingSettings,
        registry: Arc<ModelRegistry<TextEmbedding>>,
        pool: WorkerPool,
    ) -> Result<Self> {
        let (model_id, source) = match &settings.model_dir {
            Some(dir) => (dir.clone(), ModelSource::LocalDir(PathBuf::from(dir))),
            None => {
                let model = builtin_model(&settings.model)
                    .ok_or_else(|| anyhow::anyhow!("Unsupported embedding model: {}", settings.model))?;
                (settings.model.clone(), ModelSource::Builtin(model))
            }
        };

        Ok(Self {
            model_id,
            source,
            cache_dir: PathBuf::from(&settings.cache_dir),
            timeout: Duration::from_secs(settings.timeout_secs),
            registry,
            pool,
        })
    }

    async fn model(&self) -> crate::error::Result<Arc<TextEmbedding>> {
        let source = self.source.clone();
        let cache_dir = self.cache_dir.clone();
        self.registry
            .get_or_load(&self.model_id, move || load(source, cache_dir))
            .await
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: Vec<String>) -> crate::error::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model().await?;
        let expected = texts.len();
        let vectors = self
            .pool
            .run_blocking("embedder", self.timeout, move || model.embed(texts, None))
            .await?;

        if vectors.len() != expected {
            return Err(RagError::upstream(
                "embedder",
                format!("expected {} vectors, got {}", expected, vectors.len()),
            ));
        }
        Ok(vectors)
    }

    async fn warm_up(&self) -> crate::error::Result<()> {
        self.model().await.map(|_| ())
    }
}
