//! Paragraph-aligned text chunking for rewrite passes.
//!
//! Chunks are built from whole paragraphs so the rewriting service always sees
//! complete sentences. The target size is a soft bound: a paragraph is never
//! split, so one longer than the target becomes its own oversized chunk.

/// Split `text` into ordered chunks of roughly `target_size` characters.
///
/// Paragraphs are the lines between `\n` (or `\r\n`) delimiters. Each paragraph
/// is kept whole and followed by a newline inside its chunk; chunks are trimmed
/// and never empty. Sizes are counted in characters, not bytes.
pub fn chunk_by_paragraphs(text: &str, target_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in text.split('\n') {
        let paragraph = paragraph.strip_suffix('\r').unwrap_or(paragraph);
        let paragraph_len = paragraph.chars().count();

        if current_len + paragraph_len > target_size && current_len > 0 {
            push_trimmed(&mut chunks, &current);
            current.clear();
            current_len = 0;
        }

        current.push_str(paragraph);
        current.push('\n');
        current_len += paragraph_len + 1;
    }

    push_trimmed(&mut chunks, &current);
    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
