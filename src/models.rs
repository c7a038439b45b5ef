use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub type Metadata = serde_json::Map<String, JsonValue>;

/// A unit of course content as produced by ingestion. `text` is optional so
/// malformed entries survive deserialization and can be filtered by the indexer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: Some(text.into()),
            metadata,
        }
    }

    /// Lenient conversion from arbitrary JSON. Scalars in `text` are
    /// stringified, anything that is not an object yields an empty chunk.
    pub fn from_json(value: JsonValue) -> Self {
        let JsonValue::Object(mut map) = value else {
            return Self::default();
        };
        let text = match map.remove("text") {
            Some(JsonValue::String(s)) => Some(s),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(JsonValue::Bool(b)) => Some(b.to_string()),
            _ => None,
        };
        let metadata = match map.remove("metadata") {
            Some(JsonValue::Object(m)) => m,
            _ => Metadata::new(),
        };
        Self { text, metadata }
    }

    /// Text of a well-formed chunk, `None` when missing or blank.
    pub fn valid_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn lang(&self) -> Option<&str> {
        self.metadata.get("lang").and_then(JsonValue::as_str)
    }
}

/// Collection identifier derived from a course id. No other course maps to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn for_course(course_id: u64) -> Self {
        Self(format!("course_{}_mixed", course_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exact-match restriction on a metadata field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub field: String,
    pub value: String,
}

impl MetadataFilter {
    pub fn lang(code: impl Into<String>) -> Self {
        Self {
            field: "lang".to_string(),
            value: code.into(),
        }
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        metadata
            .get(&self.field)
            .and_then(JsonValue::as_str)
            .is_some_and(|v| v == self.value)
    }
}

/// Parallel arrays written to a collection in one call.
#[derive(Debug, Clone, Default)]
pub struct VectorBatch {
    pub ids: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
    pub metadatas: Vec<Metadata>,
    pub documents: Vec<String>,
}

impl VectorBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        let n = self.ids.len();
        self.vectors.len() == n && self.metadatas.len() == n && self.documents.len() == n
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub document: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Nearest-first neighbours of a query vector.
pub type RetrievalResult = Vec<RetrievedDocument>;

// Pipeline payloads

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedPayload {
    pub collection: String,
    pub chunks_added: usize,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPayload {
    pub collection: String,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub distances: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub question: String,
    pub question_lang: String,
    pub answer: String,
    pub sources: Vec<Metadata>,
    pub retrieved_langs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesPayload {
    pub language: String,
    pub notes: String,
    pub sources_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Metadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsPayload {
    pub collection: String,
    pub document_count: u64,
}

// Speech-to-text result shape consumed by ingestion

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub detected_lang: Option<String>,
}

// HTTP request types

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingRequest {
    pub course_id: u64,
    #[serde(default)]
    pub chunks: Vec<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub course_id: u64,
    pub query: String,
    pub n_results: Option<u64>,
    pub language_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsQuery {
    pub course_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub course_id: u64,
    pub question: String,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotesRequest {
    pub course_id: u64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub include_sources: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllNotesRequest {
    pub course_id: u64,
    #[serde(default = "default_true")]
    pub include_sources: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptIngestRequest {
    pub course_id: u64,
    pub transcript: TranscriptResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_name_is_pure_function_of_course() {
        assert_eq!(CollectionName::for_course(42).as_str(), "course_42_mixed");
        assert_eq!(CollectionName::for_course(42), CollectionName::for_course(42));
        assert_ne!(CollectionName::for_course(4), CollectionName::for_course(42));
    }

    #[test]
    fn test_chunk_from_json_is_lenient() {
        let chunk = Chunk::from_json(json!({"text": "Hola", "metadata": {"lang": "es"}}));
        assert_eq!(chunk.valid_text(), Some("Hola"));
        assert_eq!(chunk.lang(), Some("es"));

        assert_eq!(Chunk::from_json(json!("just a string")).valid_text(), None);
        assert_eq!(Chunk::from_json(json!({"text": "   "})).valid_text(), None);
        assert_eq!(Chunk::from_json(json!({"metadata": {}})).valid_text(), None);
        assert_eq!(Chunk::from_json(json!({"text": 12})).valid_text(), Some("12"));
    }

    #[test]
    fn test_metadata_filter_exact_match() {
        let filter = MetadataFilter::lang("ca");
        let mut meta = Metadata::new();
        meta.insert("lang".into(), json!("ca"));
        assert!(filter.matches(&meta));
        meta.insert("lang".into(), json!("cat"));
        assert!(!filter.matches(&meta));
        assert!(!filter.matches(&Metadata::new()));
    }
}
