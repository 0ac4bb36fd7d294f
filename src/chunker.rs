//! Recursive text splitter.
//!
//! Splits extracted document text into overlapping chunks. The splitter
//! prefers paragraph boundaries (`\n\n`), then line boundaries, then word
//! boundaries, and only hard-cuts when a fragment has no separator at all.
//! Fragments are merged back together up to `chunk_size` characters, and
//! consecutive chunks share an `overlap`-sized tail so context is not lost
//! at chunk edges.

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Split `text` into chunks of at most `chunk_size` characters with
/// roughly `overlap` characters shared between consecutive chunks.
///
/// Returns an empty vector for empty or whitespace-only input. All cuts
/// land on `char` boundaries, so multi-byte text never panics.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.len() <= chunk_size {
        return vec![trimmed.to_string()];
    }

    let mut fragments = Vec::new();
    fragment(trimmed, chunk_size, 0, &mut fragments);
    merge(&fragments, chunk_size, overlap)
}

/// Break text into fragments no longer than `max`, preferring coarser
/// separators first. Separators stay attached to the preceding fragment so
/// merging is plain concatenation.
fn fragment<'a>(text: &'a str, max: usize, sep_idx: usize, out: &mut Vec<&'a str>) {
    if text.len() <= max {
        out.push(text);
        return;
    }
    if sep_idx >= SEPARATORS.len() {
        hard_split(text, max, out);
        return;
    }
    for part in text.split_inclusive(SEPARATORS[sep_idx]) {
        if part.len() <= max {
            out.push(part);
        } else {
            fragment(part, max, sep_idx + 1, out);
        }
    }
}

/// Cut at `max` bytes, backed off to the nearest char boundary.
fn hard_split<'a>(text: &'a str, max: usize, out: &mut Vec<&'a str>) {
    let mut rest = text;
    while rest.len() > max {
        let mut cut = max;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single char wider than max; emit it whole.
            cut = rest
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
        }
        out.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        out.push(rest);
    }
}

/// Greedily pack fragments into chunks, carrying an overlap tail forward.
fn merge(fragments: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut window_len = 0usize;

    for frag in fragments {
        if window_len + frag.len() > chunk_size && !window.is_empty() {
            push_chunk(&window, &mut chunks);
            // Drop fragments from the front until what remains fits as the
            // overlap tail of the next chunk.
            while window_len > overlap
                || (window_len + frag.len() > chunk_size && !window.is_empty())
            {
                let removed = window.remove(0);
                window_len -= removed.len();
                if window.is_empty() {
                    break;
                }
            }
        }
        window.push(frag);
        window_len += frag.len();
    }
    if !window.is_empty() {
        push_chunk(&window, &mut chunks);
    }
    chunks
}

fn push_chunk(window: &[&str], chunks: &mut Vec<String>) {
    let joined = window.concat();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(split_text("", 1000, 200).is_empty());
        assert!(split_text("   \n\n  ", 1000, 200).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("Hello, world!", 1000, 200);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let text = (0..80)
            .map(|i| format!("Paragraph number {} with a little padding text.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text(&text, 200, 40);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 200, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks = split_text(text, 30, 0);
        // Each paragraph fits on its own, so no paragraph is cut mid-way.
        assert!(chunks.iter().any(|c| c == "First paragraph here."));
        assert!(chunks.iter().any(|c| c == "Third paragraph here."));
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let words = (0..100)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&words, 120, 40);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail_word = pair[0].split_whitespace().last().unwrap();
            assert!(
                pair[1].contains(tail_word),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "x".repeat(2500);
        let chunks = split_text(&text, 1000, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[2].len(), 500);
    }

    #[test]
    fn test_multibyte_text_never_panics() {
        let text = "œuvre café ".repeat(300);
        let chunks = split_text(&text, 100, 20);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.len() <= 100);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta".repeat(20);
        assert_eq!(split_text(&text, 80, 16), split_text(&text, 80, 16));
    }
}
