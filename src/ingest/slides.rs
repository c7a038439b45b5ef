use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use super::chunker::{chunk_text, MAX_CHUNK_CHARS};
use super::walker::SlideFormat;
use crate::models::{Chunk, Metadata};
use crate::rag::language::{detect_or_default, Language, LanguageDetector};

/// Text of one slide or page, numbered from 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideText {
    pub number: usize,
    pub text: String,
}

pub fn extract_slides(path: &Path, format: SlideFormat) -> Result<Vec<SlideText>> {
    let slides = match format {
        SlideFormat::PlainText => extract_plain_text(path)?,
        SlideFormat::Pdf => extract_pdf(path)?,
        SlideFormat::Pptx => extract_pptx(path)?,
    };
    Ok(slides.into_iter().filter(|s| !s.text.trim().is_empty()).collect())
}

fn numbered(pages: impl IntoIterator<Item = String>) -> Vec<SlideText> {
    pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| SlideText { number: i + 1, text })
        .collect()
}

/// Markdown-style decks separate slides with a line containing only `---`.
fn split_plain_slides(content: &str) -> Vec<String> {
    let mut slides = vec![String::new()];
    for line in content.lines() {
        if line.trim() == "---" {
            slides.push(String::new());
        } else if let Some(current) = slides.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    slides
}

fn extract_plain_text(path: &Path) -> Result<Vec<SlideText>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read text file: {}", path.display()))?;
    Ok(numbered(split_plain_slides(&content)))
}

fn extract_pdf(path: &Path) -> Result<Vec<SlideText>> {
    let text = pdf_extract::extract_text(path)
        .with_context(|| format!("Failed to extract PDF text: {}", path.display()))?;
    // pdf-extract separates pages with form feeds.
    Ok(numbered(text.split('\u{c}').map(str::to_string)))
}

fn slide_number(entry_name: &str) -> Option<usize> {
    entry_name
        .strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn extract_pptx(path: &Path) -> Result<Vec<SlideText>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open PPTX: {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read PPTX as ZIP: {}", path.display()))?;

    let mut slides = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(number) = slide_number(entry.name()) else {
            continue;
        };
        let mut xml_content = String::new();
        entry.read_to_string(&mut xml_content)?;
        slides.push(SlideText {
            number,
            text: extract_text_from_xml(&xml_content, "a:t"),
        });
    }

    // Archive order is not slide order (slide10 sorts before slide2).
    slides.sort_by_key(|s| s.number);
    Ok(slides)
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn extract_text_from_xml(xml: &str, tag: &str) -> String {
    let open_tag = format!("<{}", tag);
    let close_tag = format!("</{}>", tag);
    let mut texts = Vec::new();
    let mut search_from = 0;

    while let Some(open_pos) = xml[search_from..].find(&open_tag) {
        let abs_open = search_from + open_pos;
        // Skip the attributes of the opening tag.
        let Some(tag_end) = xml[abs_open..].find('>') else {
            break;
        };
        let content_start = abs_open + tag_end + 1;
        let Some(close_pos) = xml[content_start..].find(&close_tag) else {
            break;
        };
        let content = &xml[content_start..content_start + close_pos];
        if !content.is_empty() {
            texts.push(unescape_xml(content));
        }
        search_from = content_start + close_pos + close_tag.len();
    }

    texts.join(" ")
}

/// Chunks for every slide of a deck, tagged with slide number and language.
pub fn chunks_from_slides(
    detector: &dyn LanguageDetector,
    path: &Path,
    format: SlideFormat,
    fallback: Language,
) -> Result<Vec<Chunk>> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(slides_to_chunks(detector, &file_name, extract_slides(path, format)?, fallback))
}

fn slides_to_chunks(
    detector: &dyn LanguageDetector,
    file_name: &str,
    slides: Vec<SlideText>,
    fallback: Language,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for slide in slides {
        let lang = detect_or_default(detector, &slide.text, fallback);
        for piece in chunk_text(&slide.text, MAX_CHUNK_CHARS, 50) {
            let mut metadata = Metadata::new();
            metadata.insert("lang".into(), json!(lang.code()));
            metadata.insert("source".into(), json!("slides"));
            metadata.insert("slide".into(), json!(slide.number));
            metadata.insert("file".into(), json!(file_name));
            chunks.push(Chunk::new(piece.text, metadata));
        }
    }
    chunks
}
