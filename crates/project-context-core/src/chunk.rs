//! Paragraph-boundary text chunker.
//!
//! Artifact bodies are split on blank lines (`\n\n`) and paragraphs are
//! packed greedily into chunks of at most `max_chars` characters. A single
//! paragraph longer than the limit is hard-split, preferring the last
//! newline or space before the limit.
//!
//! Lengths are counted in `char`s, so multi-byte text is never cut inside
//! a character.
//!
//! ```rust
//! use project_context_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", 1000);
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph."]);
//! ```

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Blank input yields no chunks. A `max_chars` of zero is treated as one.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_chars = trimmed.chars().count();

        let would_be = if buf.is_empty() {
            para_chars
        } else {
            buf_chars + 2 + para_chars
        };
        if would_be > max_chars && !buf.is_empty() {
            chunks.push(std::mem::take(&mut buf));
            buf_chars = 0;
        }

        if para_chars > max_chars {
            hard_split(trimmed, max_chars, &mut chunks);
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
            buf_chars += 2;
        }
        buf.push_str(trimmed);
        buf_chars += para_chars;
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}

fn hard_split(mut remaining: &str, max_chars: usize, out: &mut Vec<String>) {
    while !remaining.is_empty() {
        let limit = byte_offset(remaining, max_chars);
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind(|c: char| c == '\n' || c == ' ')
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

/// Byte offset of the `n`th char, or the string length.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
