/// Upper bound on chunk length, in bytes, used for lecture material.
pub const MAX_CHUNK_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
}

/// Round a byte offset up to the next char boundary.
fn ceil_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Round a byte offset down to the previous char boundary.
fn floor_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Split `text` into chunks of at most `max_chunk_size` bytes, preferring
/// paragraph, line and sentence boundaries, with `overlap` bytes carried
/// over between consecutive chunks.
pub fn chunk_text(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.len() <= max_chunk_size {
        return vec![TextChunk {
            text: text.to_string(),
            chunk_index: 0,
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chunk_index = 0;

    while start < text.len() {
        let end = floor_char_boundary(text, (start + max_chunk_size).min(text.len()));
        let end = if end <= start {
            ceil_char_boundary(text, start + 1)
        } else {
            end
        };

        let actual_end = if end < text.len() {
            find_break_point(text, start, end)
        } else {
            end
        };

        let piece = text[start..actual_end].trim();
        if !piece.is_empty() {
            chunks.push(TextChunk {
                text: piece.to_string(),
                chunk_index,
            });
            chunk_index += 1;
        }

        if actual_end >= text.len() {
            break;
        }

        let next_start = if actual_end > overlap {
            floor_char_boundary(text, actual_end - overlap)
        } else {
            actual_end
        };

        start = if next_start <= start { actual_end } else { next_start };
    }

    chunks
}

fn find_break_point(text: &str, start: usize, max_end: usize) -> usize {
    let segment = &text[start..max_end];

    if let Some(pos) = segment.rfind("\n\n") {
        if pos > 0 {
            return start + pos + 2;
        }
    }
    if let Some(pos) = segment.rfind('\n') {
        if pos > 0 {
            return start + pos + 1;
        }
    }
    for sentinel in [". ", "? ", "! ", "; ", ": "] {
        if let Some(pos) = segment.rfind(sentinel) {
            return start + pos + sentinel.len();
        }
    }
    if let Some(pos) = segment.rfind(' ') {
        if pos > 0 {
            return start + pos + 1;
        }
    }
    max_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalan_text_respects_char_boundaries() {
        let text = "Aquesta és una classe d'informàtica. Una pila és una estructura de dades. \
                    L'últim element que entra és el primer que surt. També veurem cues i arbres binaris.";
        let chunks = chunk_text(text, 60, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.text.is_empty());
            assert!(chunk.text.len() <= 60);
        }
    }

    #[test]
    fn test_prefers_sentence_boundaries() {
        let text = "Una pila es LIFO. Una cola es FIFO. Un árbol binario tiene como máximo dos hijos por nodo.";
        let chunks = chunk_text(text, 40, 0);
        assert_eq!(chunks[0].text, "Una pila es LIFO. Una cola es FIFO.");
        assert_eq!(chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(), (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("short", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("  \n ", 100, 10).is_empty());
    }

    #[test]
    fn test_unbroken_text_still_terminates() {
        let text = "x".repeat(1050);
        let chunks = chunk_text(&text, 500, 100);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.text.len() <= 500));
    }
}
