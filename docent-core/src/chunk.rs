//! Document chunking: overlapping fixed-size windows over parsed blocks.
//!
//! Windows snap to a paragraph boundary when one falls in the second half
//! of the window, then to a sentence boundary, and only then cut hard.
//! Chunk indices are assigned across the whole document in source order.

use crate::parser::TextBlock;
use crate::types::DocumentChunk;

/// Split parsed blocks into chunks for one document.
///
/// `chunk_index` values form the contiguous sequence `0..N` in source
/// order; each chunk inherits the location of the block it came from.
pub fn chunk_blocks(
    doc_id: &str,
    blocks: &[TextBlock],
    window: usize,
    overlap: usize,
) -> Vec<DocumentChunk> {
    let window = window.max(1);
    // Overlap beyond half the window stalls forward progress.
    let overlap = overlap.min(window / 2);

    let mut chunks = Vec::new();
    for block in blocks {
        for text in split_text(&block.text, window, overlap) {
            chunks.push(DocumentChunk {
                doc_id: doc_id.to_string(),
                chunk_index: chunks.len(),
                text,
                location: block.location.clone(),
            });
        }
    }
    chunks
}

/// Split one block of text into windows of at most `window` characters.
fn split_text(text: &str, window: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= window {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + window).min(chars.len());
        let end = if hard_end < chars.len() {
            find_break(&chars, start, hard_end)
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }

        if end >= chars.len() {
            break;
        }
        // Step back for overlap, but always make forward progress.
        start = end.saturating_sub(overlap).max(start + 1);
    }
    pieces
}

/// Pick a break position in `(mid..hard_end]`, preferring a paragraph
/// boundary, then a sentence boundary, else the hard cut.
fn find_break(chars: &[char], start: usize, hard_end: usize) -> usize {
    let mid = start + (hard_end - start) / 2;

    let mut i = hard_end;
    while i > mid + 1 {
        if chars[i - 1] == '\n' && chars[i - 2] == '\n' {
            return i;
        }
        i -= 1;
    }

    let mut i = hard_end;
    while i > mid + 1 {
        if chars[i - 1].is_whitespace() && matches!(chars[i - 2], '.' | '!' | '?') {
            return i;
        }
        i -= 1;
    }

    hard_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkLocation;

    fn block(text: &str, ordinal: usize) -> TextBlock {
        TextBlock {
            text: text.to_string(),
            location: ChunkLocation::Paragraph { ordinal },
        }
    }

    #[test]
    fn test_short_block_is_one_chunk() {
        let chunks = chunk_blocks("doc", &[block("hello world", 1)], 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "hello world");
    }

    #[test]
    fn test_indices_contiguous_across_blocks() {
        let blocks = vec![
            block("first paragraph", 1),
            block("second paragraph", 2),
            block("third paragraph", 3),
        ];
        let chunks = chunk_blocks("doc", &blocks, 100, 10);
        let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(
            chunks[1].location,
            ChunkLocation::Paragraph { ordinal: 2 }
        );
    }

    #[test]
    fn test_long_block_splits_within_window() {
        let text = "word ".repeat(100);
        let chunks = chunk_blocks("doc", &[block(&text, 1)], 80, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 80);
            assert!(!chunk.text.trim().is_empty());
        }
    }

    #[test]
    fn test_sentence_boundary_preferred() {
        let text = format!("{}. {}", "a".repeat(60), "b".repeat(60));
        let chunks = chunk_blocks("doc", &[block(&text, 1)], 80, 0);
        // The cut lands after the sentence, not mid-run of 'b's.
        assert!(chunks[0].text.ends_with('.'));
        assert!(chunks[1].text.starts_with('b'));
    }

    #[test]
    fn test_paragraph_boundary_preferred_over_sentence() {
        let text = format!("{}. tail\n\n{}", "a".repeat(40), "b".repeat(60));
        let chunks = chunk_blocks("doc", &[block(&text, 1)], 80, 0);
        assert!(chunks[0].text.ends_with("tail"));
    }

    #[test]
    fn test_overlap_repeats_tail() {
        let text = "x".repeat(200);
        let chunks = chunk_blocks("doc", &[block(&text, 1)], 100, 20);
        assert!(chunks.len() >= 2);
        // 200 chars with window 100 and overlap 20 yields windows starting
        // at 0 and 80 and 160; total text covers everything.
        let total: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
        assert!(total >= 200);
    }

    #[test]
    fn test_empty_and_whitespace_blocks_dropped() {
        let blocks = vec![block("", 1), block("   ", 2), block("real", 3)];
        let chunks = chunk_blocks("doc", &blocks, 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "real");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_deterministic() {
        let blocks = vec![block(&"sentence one. sentence two. ".repeat(20), 1)];
        let a = chunk_blocks("doc", &blocks, 120, 30);
        let b = chunk_blocks("doc", &blocks, 120, 30);
        assert_eq!(a, b);
    }
}
