pub mod embeddings;
pub mod indexer;
pub mod language;
pub mod memory_store;
pub mod result;
pub mod retriever;
pub mod templates;
pub mod vector_store;
pub mod workers;

use std::sync::Arc;

use anyhow::Result;
use tracing::Instrument;

use self::embeddings::{Embedder, FastEmbedder};
use self::indexer::{EmbeddingIndexer, IdStrategy};
use self::language::{resolve_language, Language, LanguageDetector, WhatlangDetector};
use self::memory_store::MemoryStore;
use self::result::{assemble, InStage, PipelineResult, Stage, StageError};
use self::retriever::Retriever;
use self::vector_store::{QdrantStore, VectorStore};
use self::workers::{ModelRegistry, WorkerPool};
use crate::config::{RetrievalSettings, Settings, StoreBackend};
use crate::error::RagError;
use crate::generation::{Generator, LlmClient};
use crate::ingest;
use crate::models::{
    ChatPayload, Chunk, CollectionName, IndexedPayload, MetadataFilter, NotesPayload, SearchPayload, StatsPayload,
    TranscriptResult,
};

/// Entry point for the surrounding service layer. Every operation returns a
/// `PipelineResult`; errors never escape as `Err`.
pub struct RagService {
    indexer: EmbeddingIndexer,
    retriever: Retriever,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    detector: Arc<dyn LanguageDetector>,
    embedder: Arc<dyn Embedder>,
    limits: RetrievalSettings,
}

impl RagService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        detector: Arc<dyn LanguageDetector>,
        limits: RetrievalSettings,
        id_strategy: IdStrategy,
    ) -> Self {
        Self {
            indexer: EmbeddingIndexer::new(embedder.clone(), store.clone(), id_strategy),
            retriever: Retriever::new(embedder.clone(), store.clone()),
            store,
            generator,
            detector,
            embedder,
            limits,
        }
    }

    /// Wire up the production collaborators described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let pool = WorkerPool::new(settings.workers.max_concurrent);
        let embedder = FastEmbedder::new(&settings.embedding, Arc::new(ModelRegistry::new()), pool.clone())?;

        let store: Arc<dyn VectorStore> = match settings.store.backend {
            StoreBackend::Qdrant => Arc::new(QdrantStore::new(&settings.store.qdrant_url)?),
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory vector store; indexed content is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let generator = LlmClient::new(&settings.generation, pool);

        Ok(Self::new(
            Arc::new(embedder),
            store,
            Arc::new(generator),
            Arc::new(WhatlangDetector),
            settings.retrieval.clone(),
            settings.indexing.id_strategy,
        ))
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn generation_model(&self) -> &str {
        self.generator.model_id()
    }

    pub fn detector(&self) -> &dyn LanguageDetector {
        self.detector.as_ref()
    }

    /// Load the embedding model now instead of on the first request.
    pub async fn warm_up(&self) -> crate::error::Result<()> {
        self.embedder.warm_up().await
    }

    pub async fn generator_healthy(&self) -> bool {
        self.generator.health_check().await
    }

    pub async fn create_embeddings(&self, course_id: u64, chunks: Vec<Chunk>) -> PipelineResult<IndexedPayload> {
        let span = tracing::info_span!("create_embeddings", course_id);
        let outcome = self.indexer.index(course_id, chunks).instrument(span).await;
        assemble("create_embeddings", outcome)
    }

    /// Turn a speech-to-text result into chunks and index them.
    pub async fn ingest_transcript(
        &self,
        course_id: u64,
        transcript: &TranscriptResult,
    ) -> PipelineResult<IndexedPayload> {
        let chunks = ingest::chunks_from_transcript(self.detector(), transcript);
        tracing::info!(course_id, segments = transcript.segments.len(), chunks = chunks.len(), "Transcript chunked");
        self.create_embeddings(course_id, chunks).await
    }

    pub async fn search(
        &self,
        course_id: u64,
        query: &str,
        top_n: Option<u64>,
        language_filter: Option<&str>,
    ) -> PipelineResult<SearchPayload> {
        let span = tracing::info_span!("search", course_id);
        let outcome = self.run_search(course_id, query, top_n, language_filter).instrument(span).await;
        assemble("search", outcome)
    }

    async fn run_search(
        &self,
        course_id: u64,
        query: &str,
        top_n: Option<u64>,
        language_filter: Option<&str>,
    ) -> Result<SearchPayload, StageError> {
        if query.trim().is_empty() {
            return Err(RagError::validation("Query text must not be empty")).in_stage(Stage::Validating);
        }
        let filter = language_filter
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| MetadataFilter::lang(code.to_ascii_lowercase()));
        let top_n = top_n.unwrap_or(self.limits.search_top_n);

        let (name, results) = self.retriever.search(course_id, query, top_n, filter.as_ref()).await?;
        if results.is_empty() {
            let message = match &filter {
                Some(f) => format!("No course content matches lang = '{}'", f.value),
                None => "No course content matches the query".to_string(),
            };
            return Err(RagError::empty(name.as_str(), message)).in_stage(Stage::Retrieving);
        }

        let mut payload = SearchPayload {
            collection: name.to_string(),
            documents: Vec::with_capacity(results.len()),
            metadatas: Vec::with_capacity(results.len()),
            distances: Vec::with_capacity(results.len()),
        };
        for hit in results {
            payload.documents.push(hit.document);
            payload.metadatas.push(hit.metadata);
            payload.distances.push(hit.distance);
        }
        Ok(payload)
    }

    pub async fn chat(&self, course_id: u64, question: &str, language: Option<&str>) -> PipelineResult<ChatPayload> {
        let span = tracing::info_span!("chat", course_id);
        let outcome = self.run_chat(course_id, question, language).instrument(span).await;
        assemble("chat", outcome)
    }

    async fn run_chat(
        &self,
        course_id: u64,
        question: &str,
        language: Option<&str>,
    ) -> Result<ChatPayload, StageError> {
        if question.trim().is_empty() {
            return Err(RagError::validation("Question must not be empty")).in_stage(Stage::Validating);
        }
        let language = resolve_language(self.detector(), language, question);
        tracing::debug!(language = %language, "Resolved response language");

        let retrieved = self
            .retriever
            .retrieve_context(course_id, question, self.limits.chat_top_n, None)
            .await?;

        let prompt = templates::build_chat_prompt(language, &retrieved.context, question);
        tracing::debug!(stage = %Stage::Templating, prompt_chars = prompt.len(), "Prompt built");

        let answer = self.generator.generate(&prompt).await.in_stage(Stage::Generating)?;

        Ok(ChatPayload {
            question: question.to_string(),
            question_lang: language.code().to_string(),
            answer,
            sources: retrieved.sources,
            retrieved_langs: retrieved.retrieved_langs,
        })
    }

    pub async fn generate_notes(
        &self,
        course_id: u64,
        language: &str,
        include_sources: bool,
    ) -> PipelineResult<NotesPayload> {
        let language = Language::from_code_or_default(language);
        let span = tracing::info_span!("generate_notes", course_id, language = %language);
        let outcome = self.notes(course_id, language, include_sources).instrument(span).await;
        assemble("generate_notes", outcome)
    }

    /// Notes in every supported language, generated concurrently. Each
    /// language succeeds or fails on its own.
    pub async fn generate_all_notes(&self, course_id: u64, include_sources: bool) -> Vec<PipelineResult<NotesPayload>> {
        let runs = Language::ALL
            .iter()
            .map(|language| self.generate_notes(course_id, language.code(), include_sources));
        futures::future::join_all(runs).await
    }

    async fn notes(
        &self,
        course_id: u64,
        language: Language,
        include_sources: bool,
    ) -> Result<NotesPayload, StageError> {
        let query = templates::summary_query(language);
        let retrieved = self
            .retriever
            .retrieve_context(course_id, query, self.limits.notes_top_n, None)
            .await?;
        tracing::debug!(documents = retrieved.len(), context_chars = retrieved.context.len(), "Context retrieved");

        let prompt = templates::build_notes_prompt(language, &retrieved.context, include_sources);
        let notes = self.generator.generate(&prompt).await.in_stage(Stage::Generating)?;

        let (sources_count, sources) = if include_sources {
            (retrieved.len(), retrieved.sources)
        } else {
            (0, Vec::new())
        };
        Ok(NotesPayload {
            language: language.code().to_string(),
            notes,
            sources_count,
            sources,
        })
    }

    pub async fn collection_stats(&self, course_id: u64) -> PipelineResult<StatsPayload> {
        let outcome = self.stats(course_id).await;
        assemble("collection_stats", outcome)
    }

    async fn stats(&self, course_id: u64) -> Result<StatsPayload, StageError> {
        let name = CollectionName::for_course(course_id);
        let collection = self.store.get(&name).await.in_stage(Stage::Retrieving)?;
        let document_count = self.store.count(&collection).await.in_stage(Stage::Retrieving)?;
        Ok(StatsPayload {
            collection: name.to_string(),
            document_count,
        })
    }
}
