//! Splitting replies that exceed a platform's message length.

/// Split `text` into chunks of at most `max_len` bytes.
///
/// Prefers to break at the last newline inside the window, falls back to a
/// hard cut for over-long lines, and never cuts inside a UTF-8 character.
/// Text that already fits comes back as a single chunk.
///
/// The split is lossy. Every newline at a split point is consumed, so a
/// blank line separating two chunks disappears, and chunks containing only
/// whitespace are dropped because chat platforms reject them. Joining the
/// chunks does not always give back `text`.
pub fn split_long_text(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            push_chunk(&mut chunks, remaining);
            break;
        }

        let limit = floor_char_boundary(remaining, max_len);
        let window = &remaining[..limit];

        match window.rfind('\n') {
            Some(pos) if pos > 0 => {
                push_chunk(&mut chunks, &remaining[..pos]);
                remaining = &remaining[pos..];
            }
            _ => {
                // A single character wider than max_len still has to go somewhere.
                let cut = if limit == 0 {
                    remaining.chars().next().map_or(remaining.len(), char::len_utf8)
                } else {
                    limit
                };
                push_chunk(&mut chunks, &remaining[..cut]);
                remaining = &remaining[cut..];
            }
        }
        remaining = remaining.trim_start_matches('\n');
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    if !chunk.trim().is_empty() {
        chunks.push(chunk.to_string());
    }
}

/// Largest index `<= max` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
