use serde_json::json;

use super::chunker::{chunk_text, MAX_CHUNK_CHARS};
use crate::models::{Chunk, Metadata, TranscriptResult, TranscriptSegment};
use crate::rag::language::{detect_or_default, Language, LanguageDetector};

/// `HH:MM:SS` for a position in seconds.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

struct Group {
    lang: Language,
    start: f64,
    end: f64,
    text: String,
}

impl Group {
    fn into_chunk(self) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert("lang".into(), json!(self.lang.code()));
        metadata.insert("source".into(), json!("transcript"));
        metadata.insert("start".into(), json!(self.start));
        metadata.insert("end".into(), json!(self.end));
        metadata.insert("timestamp".into(), json!(format_timestamp(self.start)));
        Chunk::new(self.text, metadata)
    }
}

fn segment_language(
    detector: &dyn LanguageDetector,
    segment: &TranscriptSegment,
    fallback: Language,
) -> Language {
    segment
        .detected_lang
        .as_deref()
        .and_then(Language::from_code)
        .unwrap_or_else(|| detect_or_default(detector, &segment.text, fallback))
}

/// Build chunks from a speech-to-text result. Consecutive segments in the
/// same language are merged up to `MAX_CHUNK_CHARS`; each chunk records its
/// language and where in the recording it starts.
pub fn chunks_from_transcript(
    detector: &dyn LanguageDetector,
    transcript: &TranscriptResult,
) -> Vec<Chunk> {
    let fallback = transcript
        .language
        .as_deref()
        .and_then(Language::from_code)
        .unwrap_or_else(|| detect_or_default(detector, &transcript.text, Language::default()));

    if transcript.segments.is_empty() {
        return chunk_text(&transcript.text, MAX_CHUNK_CHARS, 0)
            .into_iter()
            .map(|piece| {
                let lang = detect_or_default(detector, &piece.text, fallback);
                let mut metadata = Metadata::new();
                metadata.insert("lang".into(), json!(lang.code()));
                metadata.insert("source".into(), json!("transcript"));
                metadata.insert("chunk_index".into(), json!(piece.chunk_index));
                Chunk::new(piece.text, metadata)
            })
            .collect();
    }

    let mut chunks = Vec::new();
    let mut current: Option<Group> = None;

    for segment in &transcript.segments {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        let lang = segment_language(detector, segment, fallback);

        if text.len() > MAX_CHUNK_CHARS {
            if let Some(done) = current.take() {
                chunks.push(done.into_chunk());
            }
            for piece in chunk_text(text, MAX_CHUNK_CHARS, 0) {
                let group = Group {
                    lang,
                    start: segment.start,
                    end: segment.end,
                    text: piece.text,
                };
                chunks.push(group.into_chunk());
            }
            continue;
        }

        if let Some(group) = current.as_mut() {
            if group.lang == lang && group.text.len() + 1 + text.len() <= MAX_CHUNK_CHARS {
                group.text.push(' ');
                group.text.push_str(text);
                group.end = segment.end;
                continue;
            }
        }
        if let Some(done) = current.take() {
            chunks.push(done.into_chunk());
        }
        current = Some(Group {
            lang,
            start: segment.start,
            end: segment.end,
            text: text.to_string(),
        });
    }
    if let Some(done) = current {
        chunks.push(done.into_chunk());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RagError, Result};

    struct ByKeyword;

    impl LanguageDetector for ByKeyword {
        fn detect(&self, text: &str) -> Result<String> {
            if text.contains("pila") {
                Ok("spa".into())
            } else if text.contains("stack") {
                Ok("eng".into())
            } else {
                Err(RagError::Detection("unknown".into()))
            }
        }
    }

    fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
            detected_lang: None,
        }
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(3723.9), "01:02:03");
        assert_eq!(format_timestamp(-4.0), "00:00:00");
    }

    #[test]
    fn test_groups_consecutive_segments_by_language() {
        let transcript = TranscriptResult {
            text: String::new(),
            segments: vec![
                segment(0.0, 4.0, "A stack is LIFO."),
                segment(4.0, 9.0, "Push adds to the stack."),
                segment(9.0, 15.0, "Una pila es LIFO."),
                segment(15.0, 16.0, "   "),
                segment(16.0, 20.0, "Mmm."),
            ],
            language: Some("en".into()),
            duration: 20.0,
        };
        let chunks = chunks_from_transcript(&ByKeyword, &transcript);
        assert_eq!(chunks.len(), 3);

        assert_eq!(chunks[0].valid_text(), Some("A stack is LIFO. Push adds to the stack."));
        assert_eq!(chunks[0].lang(), Some("en"));
        assert_eq!(chunks[0].metadata["end"], json!(9.0));
        assert_eq!(chunks[1].lang(), Some("es"));
        assert_eq!(chunks[1].metadata["timestamp"], json!("00:00:09"));
        // Undetectable segment falls back to the transcript language.
        assert_eq!(chunks[2].lang(), Some("en"));
        assert!(chunks.iter().all(|c| c.metadata["source"] == json!("transcript")));
    }

    #[test]
    fn test_segment_language_hint_wins() {
        let mut seg = segment(0.0, 1.0, "A stack");
        seg.detected_lang = Some("ca".into());
        let transcript = TranscriptResult {
            segments: vec![seg],
            ..Default::default()
        };
        let chunks = chunks_from_transcript(&ByKeyword, &transcript);
        assert_eq!(chunks[0].lang(), Some("ca"));
    }

    #[test]
    fn test_long_segment_is_split_within_bounds() {
        let transcript = TranscriptResult {
            segments: vec![
                segment(0.0, 2.0, "A stack."),
                segment(2.0, 90.0, &"Push puts an item on the stack. ".repeat(40)),
                segment(90.0, 95.0, "The stack is empty."),
            ],
            language: Some("en".into()),
            ..Default::default()
        };
        let chunks = chunks_from_transcript(&ByKeyword, &transcript);
        assert!(chunks.len() >= 5);
        assert!(chunks.iter().all(|c| c.valid_text().unwrap().len() <= MAX_CHUNK_CHARS));
        assert_eq!(chunks[0].valid_text(), Some("A stack."));
        assert_eq!(chunks[1].metadata["timestamp"], json!("00:00:02"));
        assert_eq!(chunks.last().unwrap().valid_text(), Some("The stack is empty."));
    }

    #[test]
    fn test_text_only_transcript_is_split() {
        let transcript = TranscriptResult {
            text: "A stack is a list. ".repeat(40),
            ..Default::default()
        };
        let chunks = chunks_from_transcript(&ByKeyword, &transcript);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.lang() == Some("en")));
    }
}
