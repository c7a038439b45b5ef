use std::sync::Arc;

use super::embeddings::Embedder;
use super::result::{InStage, Stage, StageError};
use super::vector_store::VectorStore;
use crate::error::RagError;
use crate::models::{CollectionName, Metadata, MetadataFilter, RetrievalResult};

/// Documents assembled into prompt context, with their provenance.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub context: String,
    pub sources: Vec<Metadata>,
    pub retrieved_langs: Vec<String>,
    pub results: RetrievalResult,
}

impl RetrievedContext {
    fn from_results(results: RetrievalResult) -> Self {
        let context = results
            .iter()
            .map(|r| r.document.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources: Vec<Metadata> = results.iter().map(|r| r.metadata.clone()).collect();
        let retrieved_langs = sources
            .iter()
            .map(|m| m.get("lang").and_then(|v| v.as_str()).unwrap_or("unknown").to_string())
            .collect();
        Self {
            context,
            sources,
            retrieved_langs,
            results,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Embeds queries with the indexing model and pulls nearest neighbours
/// from the course collection.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Raw nearest-neighbour results. Empty is a valid outcome here.
    pub async fn search(
        &self,
        course_id: u64,
        query: &str,
        top_n: u64,
        filter: Option<&MetadataFilter>,
    ) -> Result<(CollectionName, RetrievalResult), StageError> {
        if top_n == 0 {
            return Err(RagError::validation("top_n must be at least 1")).in_stage(Stage::Validating);
        }

        let name = CollectionName::for_course(course_id);
        let collection = self.store.get(&name).await.in_stage(Stage::Retrieving)?;

        let vector = self.embedder.embed_one(query).await.in_stage(Stage::Embedding)?;

        let results = self
            .store
            .query(&collection, vector, top_n, filter)
            .await
            .in_stage(Stage::Retrieving)?;

        tracing::debug!(
            course_id,
            collection = %name,
            hits = results.len(),
            filter = ?filter.map(|f| &f.value),
            "Retrieved documents"
        );
        Ok((name, results))
    }

    /// Retrieve and assemble prompt context. Zero hits is an `EmptyResult`.
    pub async fn retrieve_context(
        &self,
        course_id: u64,
        query: &str,
        top_n: u64,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievedContext, StageError> {
        let (name, results) = self.search(course_id, query, top_n, filter).await?;
        if results.is_empty() {
            let message = match filter {
                Some(f) => format!("No course content matches {} = '{}'", f.field, f.value),
                None => "No relevant content found in the course material".to_string(),
            };
            return Err(RagError::empty(name.as_str(), message)).in_stage(Stage::Retrieving);
        }
        Ok(RetrievedContext::from_results(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievedDocument;
    use serde_json::json;

    fn doc(text: &str, lang: Option<&str>, distance: f32) -> RetrievedDocument {
        let mut metadata = Metadata::new();
        if let Some(l) = lang {
            metadata.insert("lang".into(), json!(l));
        }
        metadata.insert("slide".into(), json!(3));
        RetrievedDocument {
            document: text.to_string(),
            metadata,
            distance,
        }
    }

    #[test]
    fn test_context_joins_in_order_and_defaults_lang() {
        let ctx = RetrievedContext::from_results(vec![
            doc("first", Some("es"), 0.1),
            doc("second", None, 0.2),
            doc("third", Some("ca"), 0.3),
        ]);
        assert_eq!(ctx.context, "first\n\nsecond\n\nthird");
        assert_eq!(ctx.retrieved_langs, ["es", "unknown", "ca"]);
        assert_eq!(ctx.sources.len(), 3);
        assert_eq!(ctx.sources[1]["slide"], json!(3));
        assert_eq!(ctx.len(), 3);
    }
}
