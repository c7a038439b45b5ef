//! Turning course material (transcripts, slide decks) into indexable chunks.

pub mod chunker;
pub mod slides;
pub mod transcript;
pub mod walker;

pub use chunker::{chunk_text, TextChunk, MAX_CHUNK_CHARS};
pub use slides::{chunks_from_slides, extract_slides, SlideText};
pub use transcript::{chunks_from_transcript, format_timestamp};
pub use walker::{walk_course_dir, CourseFile, SlideFormat};
