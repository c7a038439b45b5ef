use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::{Map as JsonMap, Value as JsonValue};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::{CollectionName, Metadata, MetadataFilter, RetrievalResult, RetrievedDocument, VectorBatch};

/// Handle to an existing collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub name: CollectionName,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection on first use. Never fails because it is absent.
    async fn get_or_create(&self, name: &CollectionName, dimension: usize) -> Result<Collection>;

    /// Fails with `NotFound` if the collection was never created.
    async fn get(&self, name: &CollectionName) -> Result<Collection>;

    /// Insert or overwrite by id.
    async fn add(&self, collection: &Collection, batch: VectorBatch) -> Result<()>;

    /// Nearest `top_n` documents, nearest first. Empty when nothing matches.
    async fn query(
        &self,
        collection: &Collection,
        vector: Vec<f32>,
        top_n: u64,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult>;

    async fn count(&self, collection: &Collection) -> Result<u64>;
}

/// One async mutex per collection name.
#[derive(Default)]
pub struct CollectionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_collection(&self, name: &CollectionName) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(name.as_str().to_string()).or_default().clone()
    }
}

fn check_batch(batch: &VectorBatch) -> Result<()> {
    if !batch.is_consistent() {
        return Err(RagError::validation(format!(
            "Mismatched batch: {} ids, {} vectors, {} metadatas, {} documents",
            batch.ids.len(),
            batch.vectors.len(),
            batch.metadatas.len(),
            batch.documents.len()
        )));
    }
    Ok(())
}

/// Stable point UUID for a chunk id within a collection.
pub fn point_uuid(collection: &CollectionName, chunk_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collection.as_str().as_bytes());
    hasher.update(b"/");
    hasher.update(chunk_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

pub struct QdrantStore {
    client: Qdrant,
    create_locks: CollectionLocks,
}

impl QdrantStore {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        tracing::info!("Building Qdrant client for URL: {}", url);
        let client = match Qdrant::from_url(url).build() {
            Ok(c) => {
                tracing::info!("Qdrant client built successfully");
                c
            }
            Err(e) => {
                tracing::error!("Qdrant client build failed: {:?}", e);
                anyhow::bail!("Qdrant client build failed: {}", e);
            }
        };

        Ok(Self {
            client,
            create_locks: CollectionLocks::new(),
        })
    }

    async fn exists(&self, name: &CollectionName) -> Result<bool> {
        self.client
            .collection_exists(name.as_str())
            .await
            .map_err(|e| RagError::upstream("qdrant", e))
    }
}

fn to_document(point: qdrant_client::qdrant::ScoredPoint) -> Option<RetrievedDocument> {
    let mut payload = point.payload;
    let document = payload.remove("text")?.as_str()?.to_string();
    let metadata = match payload.remove("metadata").map(|v| v.into_json()) {
        Some(JsonValue::Object(map)) => map,
        _ => Metadata::new(),
    };
    Some(RetrievedDocument {
        document,
        metadata,
        // Cosine similarity -> distance so that smaller means nearer.
        distance: 1.0 - point.score,
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn get_or_create(&self, name: &CollectionName, dimension: usize) -> Result<Collection> {
        let lock = self.create_locks.for_collection(name);
        let _guard = lock.lock().await;

        if !self.exists(name).await? {
            tracing::info!(collection = %name, dimension, "Creating collection");
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(name.as_str())
                        .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
                )
                .await
                .map_err(|e| RagError::upstream("qdrant", e))?;
        }
        Ok(Collection { name: name.clone() })
    }

    async fn get(&self, name: &CollectionName) -> Result<Collection> {
        if self.exists(name).await? {
            Ok(Collection { name: name.clone() })
        } else {
            Err(RagError::not_found(name.as_str()))
        }
    }

    async fn add(&self, collection: &Collection, batch: VectorBatch) -> Result<()> {
        check_batch(&batch)?;
        if batch.is_empty() {
            return Ok(());
        }

        let VectorBatch {
            ids,
            vectors,
            metadatas,
            documents,
        } = batch;

        let points: Vec<PointStruct> = ids
            .into_iter()
            .zip(vectors)
            .zip(metadatas)
            .zip(documents)
            .map(|(((id, vector), metadata), document)| {
                let mut payload_map = JsonMap::new();
                payload_map.insert("text".to_string(), JsonValue::String(document));
                payload_map.insert("chunk_id".to_string(), JsonValue::String(id.clone()));
                payload_map.insert("metadata".to_string(), JsonValue::Object(metadata));
                PointStruct::new(point_uuid(&collection.name, &id), vector, payload_map)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection.name.as_str(), points).wait(true))
            .await
            .map_err(|e| RagError::upstream("qdrant", e))?;

        Ok(())
    }

    async fn query(
        &self,
        collection: &Collection,
        vector: Vec<f32>,
        top_n: u64,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult> {
        let mut builder = SearchPointsBuilder::new(collection.name.as_str(), vector, top_n).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(Filter::must([Condition::matches(
                format!("metadata.{}", f.field),
                f.value.clone(),
            )]));
        }

        let search_result = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::upstream("qdrant", e))?;

        Ok(search_result.result.into_iter().filter_map(to_document).collect())
    }

    async fn count(&self, collection: &Collection) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection.name.as_str()).exact(true))
            .await
            .map_err(|e| RagError::upstream("qdrant", e))?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_uuid_is_stable_and_scoped() {
        let a = CollectionName::for_course(1);
        let b = CollectionName::for_course(2);
        assert_eq!(point_uuid(&a, "chunk_0000"), point_uuid(&a, "chunk_0000"));
        assert_ne!(point_uuid(&a, "chunk_0000"), point_uuid(&a, "chunk_0001"));
        assert_ne!(point_uuid(&a, "chunk_0000"), point_uuid(&b, "chunk_0000"));
        assert!(uuid::Uuid::parse_str(&point_uuid(&a, "x")).is_ok());
    }

    #[test]
    fn test_mismatched_batch_is_rejected() {
        let batch = VectorBatch {
            ids: vec!["chunk_0000".into()],
            vectors: vec![],
            metadatas: vec![Metadata::new()],
            documents: vec!["doc".into()],
        };
        assert!(matches!(check_batch(&batch), Err(RagError::Validation(_))));
    }

    #[test]
    fn test_locks_are_shared_per_collection() {
        let locks = CollectionLocks::new();
        let a = locks.for_collection(&CollectionName::for_course(1));
        let again = locks.for_collection(&CollectionName::for_course(1));
        let other = locks.for_collection(&CollectionName::for_course(2));
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
