//! Property-based tests for the chunker and the reference index using
//! proptest.

use proptest::prelude::*;

use docent_core::chunk::chunk_blocks;
use docent_core::types::ChunkLocation;
use docent_core::{EmbeddingRecord, InMemoryIndex, TextBlock, VectorIndex};

fn single_block(text: &str) -> Vec<TextBlock> {
    vec![TextBlock {
        text: text.to_string(),
        location: ChunkLocation::Paragraph { ordinal: 1 },
    }]
}

fn non_whitespace(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

proptest! {
    #[test]
    fn chunk_indices_are_contiguous_from_zero(
        text in "[a-z .\n]{0,2000}",
        window in 20usize..200,
        overlap in 0usize..50,
    ) {
        let chunks = chunk_blocks("doc", &single_block(&text), window, overlap);
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.chunk_index, i);
        }
    }

    #[test]
    fn every_chunk_fits_the_window(
        text in "[a-z .\n]{0,2000}",
        window in 20usize..200,
        overlap in 0usize..50,
    ) {
        let chunks = chunk_blocks("doc", &single_block(&text), window, overlap);
        for chunk in &chunks {
            prop_assert!(chunk.text.chars().count() <= window);
        }
    }

    #[test]
    fn chunks_are_nonempty_slices_of_the_source(
        text in "[a-z .\n]{0,2000}",
        window in 20usize..200,
        overlap in 0usize..50,
    ) {
        let chunks = chunk_blocks("doc", &single_block(&text), window, overlap);
        for chunk in &chunks {
            prop_assert!(!chunk.text.trim().is_empty());
            prop_assert!(text.contains(&chunk.text));
        }
    }

    #[test]
    fn chunks_cover_every_nonwhitespace_character(
        text in "[a-z .\n]{1,2000}",
        window in 20usize..200,
        overlap in 0usize..50,
    ) {
        let chunks = chunk_blocks("doc", &single_block(&text), window, overlap);
        // Windows tile the block with overlap, so duplicates are fine but
        // nothing may be lost.
        let covered: usize = chunks.iter().map(|c| non_whitespace(&c.text)).sum();
        prop_assert!(covered >= non_whitespace(&text));
    }

    #[test]
    fn chunking_is_deterministic(
        text in "[a-z .\n]{0,1500}",
        window in 20usize..200,
        overlap in 0usize..50,
    ) {
        let blocks = single_block(&text);
        let first = chunk_blocks("doc", &blocks, window, overlap);
        let second = chunk_blocks("doc", &blocks, window, overlap);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn indices_stay_contiguous_across_blocks(
        paragraphs in prop::collection::vec("[a-z ]{0,300}", 1..8),
        window in 20usize..200,
    ) {
        let blocks: Vec<TextBlock> = paragraphs
            .iter()
            .enumerate()
            .map(|(i, text)| TextBlock {
                text: text.clone(),
                location: ChunkLocation::Paragraph { ordinal: i + 1 },
            })
            .collect();
        let chunks = chunk_blocks("doc", &blocks, window, 10);
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.chunk_index, i);
        }
    }
}

// --- Reference index properties ---

proptest! {
    #[test]
    fn embedding_is_deterministic_and_unit_norm(text in "[a-z ]{1,400}") {
        let index = InMemoryIndex::new(64);
        let first = tokio_test::block_on(index.embed(&text)).unwrap();
        let second = tokio_test::block_on(index.embed(&text)).unwrap();
        prop_assert_eq!(&first, &second);
        let norm: f32 = first.iter().map(|x| x * x).sum::<f32>().sqrt();
        if text.chars().any(|c| c.is_alphanumeric()) {
            prop_assert!((norm - 1.0).abs() < 0.01);
        }
    }

    #[test]
    fn search_is_ranked_and_bounded_by_k(
        texts in prop::collection::vec("[a-z]{2,12}( [a-z]{2,12}){0,5}", 0..12),
        k in 0usize..8,
    ) {
        let index = InMemoryIndex::new(64);
        tokio_test::block_on(async {
            for (i, text) in texts.iter().enumerate() {
                let vector = index.embed(text).await.unwrap();
                index
                    .upsert(EmbeddingRecord {
                        chunk_id: format!("c{i}"),
                        vector,
                        doc_id: "doc".into(),
                        chunk_index: i,
                    })
                    .await
                    .unwrap();
            }
        });

        let query = tokio_test::block_on(index.embed("some query words")).unwrap();
        let hits = tokio_test::block_on(index.search(&query, k)).unwrap();
        prop_assert!(hits.len() <= k);
        for pair in hits.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }
}
