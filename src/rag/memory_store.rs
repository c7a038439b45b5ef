use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::vector_store::{Collection, VectorStore};
use crate::error::{RagError, Result};
use crate::models::{CollectionName, Metadata, MetadataFilter, RetrievalResult, RetrievedDocument, VectorBatch};

struct StoredPoint {
    vector: Vec<f32>,
    metadata: Metadata,
    document: String,
}

struct MemoryCollection {
    dimension: usize,
    // Insertion order, used to break distance ties deterministically.
    order: Vec<String>,
    points: HashMap<String, StoredPoint>,
}

/// Process-local vector store with cosine distance. Contents do not survive
/// a restart; use the Qdrant backend for persistence.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

fn dimension_error(collection: &str, expected: usize, got: usize) -> RagError {
    RagError::upstream(
        "vector store",
        format!("collection '{}' holds {}-dimensional vectors, got {}", collection, expected, got),
    )
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn get_or_create(&self, name: &CollectionName, dimension: usize) -> Result<Collection> {
        let mut collections = self.collections.write().await;
        collections.entry(name.as_str().to_string()).or_insert_with(|| {
            tracing::info!(collection = %name, dimension, "Creating in-memory collection");
            MemoryCollection {
                dimension,
                order: Vec::new(),
                points: HashMap::new(),
            }
        });
        Ok(Collection { name: name.clone() })
    }

    async fn get(&self, name: &CollectionName) -> Result<Collection> {
        if self.collections.read().await.contains_key(name.as_str()) {
            Ok(Collection { name: name.clone() })
        } else {
            Err(RagError::not_found(name.as_str()))
        }
    }

    async fn add(&self, collection: &Collection, batch: VectorBatch) -> Result<()> {
        if !batch.is_consistent() {
            return Err(RagError::validation("Mismatched batch lengths"));
        }
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection.name.as_str())
            .ok_or_else(|| RagError::not_found(collection.name.as_str()))?;

        if let Some(bad) = batch.vectors.iter().find(|v| v.len() != stored.dimension) {
            return Err(dimension_error(collection.name.as_str(), stored.dimension, bad.len()));
        }

        let VectorBatch {
            ids,
            vectors,
            metadatas,
            documents,
        } = batch;
        for (((id, vector), metadata), document) in ids.into_iter().zip(vectors).zip(metadatas).zip(documents) {
            if !stored.points.contains_key(&id) {
                stored.order.push(id.clone());
            }
            stored.points.insert(
                id,
                StoredPoint {
                    vector,
                    metadata,
                    document,
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &Collection,
        vector: Vec<f32>,
        top_n: u64,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(collection.name.as_str())
            .ok_or_else(|| RagError::not_found(collection.name.as_str()))?;

        if !stored.points.is_empty() && vector.len() != stored.dimension {
            return Err(dimension_error(collection.name.as_str(), stored.dimension, vector.len()));
        }

        let mut scored: Vec<(usize, f32, &StoredPoint)> = stored
            .order
            .iter()
            .enumerate()
            .filter_map(|(seq, id)| stored.points.get(id).map(|p| (seq, p)))
            .filter(|(_, p)| filter.map_or(true, |f| f.matches(&p.metadata)))
            .map(|(seq, p)| (seq, cosine_distance(&vector, &p.vector), p))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(top_n as usize)
            .map(|(_, distance, p)| RetrievedDocument {
                document: p.document.clone(),
                metadata: p.metadata.clone(),
                distance,
            })
            .collect())
    }

    async fn count(&self, collection: &Collection) -> Result<u64> {
        let collections = self.collections.read().await;
        collections
            .get(collection.name.as_str())
            .map(|c| c.points.len() as u64)
            .ok_or_else(|| RagError::not_found(collection.name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(lang: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("lang".into(), json!(lang));
        m
    }

    fn batch(entries: &[(&str, [f32; 2], &str)]) -> VectorBatch {
        VectorBatch {
            ids: entries.iter().map(|e| e.0.to_string()).collect(),
            vectors: entries.iter().map(|e| e.1.to_vec()).collect(),
            metadatas: entries.iter().map(|e| meta(e.2)).collect(),
            documents: entries.iter().map(|e| format!("doc {}", e.0)).collect(),
        }
    }

    #[test]
    fn test_get_fails_before_creation() {
        let store = MemoryStore::new();
        let name = CollectionName::for_course(3);
        let err = tokio_test::block_on(store.get(&name)).unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
        tokio_test::block_on(store.get_or_create(&name, 2)).unwrap();
        tokio_test::block_on(store.get(&name)).unwrap();
    }

    #[tokio::test]
    async fn test_query_orders_nearest_first_and_filters() {
        let store = MemoryStore::new();
        let c = store.get_or_create(&CollectionName::for_course(1), 2).await.unwrap();
        store
            .add(&c, batch(&[("a", [1.0, 0.0], "en"), ("b", [0.0, 1.0], "ca"), ("c", [0.7, 0.7], "es")]))
            .await
            .unwrap();

        let all = store.query(&c, vec![1.0, 0.1], 3, None).await.unwrap();
        let docs: Vec<&str> = all.iter().map(|d| d.document.as_str()).collect();
        assert_eq!(docs, ["doc a", "doc c", "doc b"]);
        assert!(all.windows(2).all(|w| w[0].distance <= w[1].distance));

        let only_ca = store.query(&c, vec![1.0, 0.1], 3, Some(&MetadataFilter::lang("ca"))).await.unwrap();
        assert_eq!(only_ca.len(), 1);
        assert_eq!(only_ca[0].metadata, meta("ca"));

        let none = store.query(&c, vec![1.0, 0.1], 3, Some(&MetadataFilter::lang("fr"))).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_same_id_overwrites() {
        let store = MemoryStore::new();
        let c = store.get_or_create(&CollectionName::for_course(1), 2).await.unwrap();
        store.add(&c, batch(&[("chunk_0000", [1.0, 0.0], "en")])).await.unwrap();
        store.add(&c, batch(&[("chunk_0000", [0.0, 1.0], "es")])).await.unwrap();
        assert_eq!(store.count(&c).await.unwrap(), 1);
        let hit = store.query(&c, vec![0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hit[0].metadata, meta("es"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_upstream_error() {
        let store = MemoryStore::new();
        let c = store.get_or_create(&CollectionName::for_course(1), 2).await.unwrap();
        let mut b = batch(&[("a", [1.0, 0.0], "en")]);
        b.vectors[0].push(0.5);
        let err = store.add(&c, b).await.unwrap_err();
        assert!(matches!(err, RagError::Upstream { .. }));
    }
}
