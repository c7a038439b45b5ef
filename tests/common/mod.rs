#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use course_rag::config::RetrievalSettings;
use course_rag::error::{RagError, Result};
use course_rag::generation::Generator;
use course_rag::models::{Chunk, Metadata};
use course_rag::rag::embeddings::Embedder;
use course_rag::rag::indexer::IdStrategy;
use course_rag::rag::language::LanguageDetector;
use course_rag::rag::memory_store::MemoryStore;
use course_rag::rag::RagService;

pub const DIMENSION: usize = 256;

/// Bag-of-words embedder. A few translations share a bucket so that the
/// same concept lands close together across languages.
pub struct HashingEmbedder;

fn canonical(word: &str) -> &str {
    match word {
        "pila" | "piles" | "stacks" => "stack",
        "cola" | "cua" | "queues" => "queue",
        "árbol" | "arbre" | "trees" => "tree",
        other => other,
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMENSION as u64) as usize
}

pub fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let lower = word.to_lowercase();
        vector[bucket(canonical(&lower))] += 1.0;
    }
    vector
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        "hashing-test"
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

/// Remembers every prompt and answers with a fixed string.
#[derive(Default)]
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_id(&self) -> &str {
        "recording-test"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("generated answer".to_string())
    }
}

pub struct FailingGenerator {
    pub retryable: bool,
}

#[async_trait]
impl Generator for FailingGenerator {
    fn model_id(&self) -> &str {
        "failing-test"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Upstream {
            service: "generator",
            message: "model server unavailable".to_string(),
            retryable: self.retryable,
        })
    }
}

/// Always reports the same ISO 639-3 code.
pub struct FixedDetector(pub &'static str);

impl LanguageDetector for FixedDetector {
    fn detect(&self, _text: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub fn limits() -> RetrievalSettings {
    RetrievalSettings {
        chat_top_n: 5,
        notes_top_n: 30,
        search_top_n: 5,
    }
}

pub fn service_with(
    generator: Arc<dyn Generator>,
    detector: Arc<dyn LanguageDetector>,
) -> RagService {
    service_with_ids(generator, detector, IdStrategy::ContentHash)
}

pub fn service_with_ids(
    generator: Arc<dyn Generator>,
    detector: Arc<dyn LanguageDetector>,
    id_strategy: IdStrategy,
) -> RagService {
    RagService::new(
        Arc::new(HashingEmbedder),
        Arc::new(MemoryStore::new()),
        generator,
        detector,
        limits(),
        id_strategy,
    )
}

pub fn chunk(text: &str, lang: &str) -> Chunk {
    let mut metadata = Metadata::new();
    metadata.insert("lang".into(), json!(lang));
    metadata.insert("source".into(), json!("transcript"));
    Chunk::new(text, metadata)
}

pub fn multilingual_course() -> Vec<Chunk> {
    vec![
        chunk("Queues are FIFO structures used for scheduling", "en"),
        chunk("Una pila es una estructura LIFO", "es"),
        chunk("La pila guarda elements en ordre LIFO", "ca"),
        chunk("Un arbre binari té com a màxim dos fills", "ca"),
    ]
}
