use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::embeddings::Embedder;
use super::result::{InStage, Stage, StageError};
use super::vector_store::{CollectionLocks, VectorStore};
use crate::error::RagError;
use crate::models::{Chunk, CollectionName, IndexedPayload, Metadata, VectorBatch};

/// How chunk ids are assigned within a write batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// `chunk_<hash>` over text, metadata and occurrence. Re-indexing the
    /// same content overwrites the same points; new content is appended.
    #[default]
    ContentHash,
    /// `chunk_0000`, `chunk_0001`, ... per batch. A second batch for the
    /// same course overwrites the first batch's leading entries.
    Sequential,
}

pub fn assign_ids(strategy: IdStrategy, chunks: &[(String, Metadata)]) -> Vec<String> {
    match strategy {
        IdStrategy::Sequential => (0..chunks.len()).map(|i| format!("chunk_{:04}", i)).collect(),
        IdStrategy::ContentHash => {
            let mut seen: HashMap<String, usize> = HashMap::new();
            chunks
                .iter()
                .map(|(text, metadata)| {
                    let mut hasher = Sha256::new();
                    hasher.update(text.as_bytes());
                    hasher.update([0u8]);
                    // serde_json::Map is ordered by key, so this is canonical.
                    hasher.update(serde_json::Value::Object(metadata.clone()).to_string().as_bytes());
                    let base = hex::encode(&hasher.finalize()[..8]);
                    let occurrence = seen.entry(base.clone()).or_insert(0);
                    let id = if *occurrence == 0 {
                        format!("chunk_{}", base)
                    } else {
                        format!("chunk_{}_{}", base, occurrence)
                    };
                    *occurrence += 1;
                    id
                })
                .collect()
        }
    }
}

/// Validates chunks, embeds them in one batch and writes them to the
/// course collection.
pub struct EmbeddingIndexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    write_locks: CollectionLocks,
    id_strategy: IdStrategy,
}

impl EmbeddingIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, id_strategy: IdStrategy) -> Self {
        Self {
            embedder,
            store,
            write_locks: CollectionLocks::new(),
            id_strategy,
        }
    }

    pub async fn index(&self, course_id: u64, chunks: Vec<Chunk>) -> Result<IndexedPayload, StageError> {
        if chunks.is_empty() {
            return Err(RagError::validation(
                "No chunks provided. Cannot create embeddings from empty list.",
            ))
            .in_stage(Stage::Validating);
        }

        let total = chunks.len();
        let valid: Vec<(String, Metadata)> = chunks
            .into_iter()
            .enumerate()
            .filter_map(|(i, chunk)| match chunk.valid_text() {
                Some(text) => Some((text.to_string(), chunk.metadata)),
                None => {
                    tracing::debug!(course_id, chunk = i, "Skipping chunk with missing or empty text");
                    None
                }
            })
            .collect();

        if valid.is_empty() {
            return Err(RagError::validation(
                "No valid chunks found. All chunks must have a non-empty 'text' field.",
            ))
            .in_stage(Stage::Validating);
        }
        if valid.len() < total {
            tracing::warn!(course_id, skipped = total - valid.len(), "Dropped malformed chunks");
        }

        let name = CollectionName::for_course(course_id);
        tracing::info!(course_id, collection = %name, chunks = valid.len(), "Creating embeddings");

        let texts: Vec<String> = valid.iter().map(|(t, _)| t.clone()).collect();
        let vectors = self.embedder.embed(texts).await.in_stage(Stage::Embedding)?;
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
            return Err(RagError::upstream("embedder", "inconsistent embedding dimensions")).in_stage(Stage::Embedding);
        }

        let ids = assign_ids(self.id_strategy, &valid);
        let (documents, metadatas): (Vec<String>, Vec<Metadata>) = valid.into_iter().unzip();
        let batch = VectorBatch {
            ids: ids.clone(),
            vectors,
            metadatas,
            documents,
        };

        let lock = self.write_locks.for_collection(&name);
        let _writer = lock.lock().await;
        let collection = self.store.get_or_create(&name, dimension).await.in_stage(Stage::Embedding)?;
        self.store.add(&collection, batch).await.in_stage(Stage::Embedding)?;

        Ok(IndexedPayload {
            collection: name.to_string(),
            chunks_added: ids.len(),
            ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(text: &str, lang: &str) -> (String, Metadata) {
        let mut m = Metadata::new();
        m.insert("lang".into(), json!(lang));
        (text.to_string(), m)
    }

    #[test]
    fn test_sequential_ids_are_zero_padded() {
        let ids = assign_ids(IdStrategy::Sequential, &[entry("a", "en"), entry("b", "en")]);
        assert_eq!(ids, ["chunk_0000", "chunk_0001"]);
    }

    #[test]
    fn test_content_hash_ids_are_stable_and_unique() {
        let batch = [entry("a", "en"), entry("a", "es"), entry("a", "en")];
        let first = assign_ids(IdStrategy::ContentHash, &batch);
        let second = assign_ids(IdStrategy::ContentHash, &batch);
        assert_eq!(first, second);
        assert_ne!(first[0], first[1]);
        assert_ne!(first[0], first[2]);
        assert!(first[2].starts_with(&first[0]));
        assert!(first.iter().all(|id| id.starts_with("chunk_")));
    }
}
