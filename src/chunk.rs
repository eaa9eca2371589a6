//! Sliding-window text chunker.
//!
//! Splits a document's text into overlapping [`Chunk`]s of at most
//! `max_size` characters. The window advances by `max_size - overlap`, so
//! consecutive chunks share at least `overlap` characters. Sizes are counted
//! in Unicode scalar values; a window never splits a code point.
//!
//! Chunk boundaries depend only on the document text and the configuration,
//! and every chunk gets a deterministic id derived from its document id and
//! start offset. Re-ingesting identical bytes therefore yields identical
//! chunk ids.

use crate::config::{validate_chunking, ChunkingConfig};
use crate::error::Result;
use crate::models::{chunk_id, Chunk, Document, PAGE_SEPARATOR};

/// A validated chunking configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Fails with [`RagError::Config`](crate::error::RagError::Config) unless
    /// `max_size > 0`, `overlap < max_size` and `min_size <= max_size`.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        validate_chunking(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `document` into chunks with contiguous indices starting at 0.
    ///
    /// An empty document yields no chunks. A document that fits in one
    /// window (including anything shorter than `min_size`) yields exactly one.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text();
        let page_starts = page_start_offsets(document);

        // Byte offset of every char boundary, plus the end of the string.
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        let char_len = boundaries.len() - 1;

        self.spans(char_len)
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| Chunk {
                id: chunk_id(&document.id, start),
                document_id: document.id.clone(),
                chunk_index: index as u32,
                text: text[boundaries[start]..boundaries[end]].to_string(),
                start,
                end,
                pages: pages_for_span(&page_starts, document, start, end),
            })
            .collect()
    }

    /// Char spans `[start, end)` covering `0..len`.
    fn spans(&self, len: usize) -> Vec<(usize, usize)> {
        let ChunkingConfig {
            max_size,
            overlap,
            min_size,
        } = self.config;

        if len == 0 {
            return Vec::new();
        }
        if len <= max_size {
            return vec![(0, len)];
        }

        let step = max_size - overlap;
        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + max_size).min(len);
            // Only the final window can come up short; pull it back so it
            // still meets min_size.
            if end - start < min_size {
                start = end.saturating_sub(min_size);
            }
            spans.push((start, end));
            if end == len {
                break;
            }
            start += step;
        }
        spans
    }
}

/// Char offset at which each page starts within [`Document::text`].
fn page_start_offsets(document: &Document) -> Vec<usize> {
    let sep_len = PAGE_SEPARATOR.chars().count();
    let mut offsets = Vec::with_capacity(document.pages.len());
    let mut pos = 0;
    for (i, page) in document.pages.iter().enumerate() {
        if i > 0 {
            pos += sep_len;
        }
        offsets.push(pos);
        pos += page.text.chars().count();
    }
    offsets
}

fn pages_for_span(page_starts: &[usize], document: &Document, start: usize, end: usize) -> Vec<u32> {
    if page_starts.is_empty() {
        return Vec::new();
    }
    let page_of = |offset: usize| page_starts.partition_point(|&s| s <= offset).saturating_sub(1);
    let first = page_of(start);
    let last = page_of(end.saturating_sub(1).max(start));

    let mut pages: Vec<u32> = document.pages[first..=last]
        .iter()
        .map(|p| p.number)
        .collect();
    pages.sort_unstable();
    pages.dedup();
    pages
}

/// Stitch chunk spans back into the text they were cut from, dropping the
/// overlapping prefix of each chunk after the first.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered: usize = 0;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start);
        out.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.end);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Page;
    use proptest::prelude::*;

    fn chunker(max_size: usize, overlap: usize, min_size: usize) -> Chunker {
        Chunker::new(ChunkingConfig {
            max_size,
            overlap,
            min_size,
        })
        .unwrap()
    }

    fn doc(text: &str) -> Document {
        Document::from_text(
            "doc.txt",
            vec![Page {
                number: 1,
                text: text.to_string(),
            }],
        )
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(Chunker::new(ChunkingConfig {
            max_size: 10,
            overlap: 10,
            min_size: 1
        })
        .is_err());
        assert!(Chunker::new(ChunkingConfig {
            max_size: 10,
            overlap: 2,
            min_size: 11
        })
        .is_err());
        assert!(Chunker::new(ChunkingConfig {
            max_size: 0,
            overlap: 0,
            min_size: 0
        })
        .is_err());
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        assert!(chunker(10, 2, 3).chunk(&doc("")).is_empty());
    }

    #[test]
    fn test_short_document_single_chunk() {
        let chunks = chunker(100, 20, 50).chunk(&doc("Hello, world!"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].pages, vec![1]);
    }

    #[test]
    fn test_sliding_window_boundaries() {
        // 26 chars, window 10, step 7
        let chunks = chunker(10, 3, 1).chunk(&doc("abcdefghijklmnopqrstuvwxyz"));
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 10), (7, 17), (14, 24), (21, 26)]);
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[3].text, "vwxyz");
        assert_eq!(reconstruct(&chunks), "abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_short_tail_is_pulled_back_to_min_size() {
        let chunks = chunker(10, 3, 8).chunk(&doc("abcdefghijklmnopqrstuvwxyz"));
        let last = chunks.last().unwrap();
        assert_eq!((last.start, last.end), (18, 26));
        assert_eq!(last.text.chars().count(), 8);
    }

    #[test]
    fn test_overlap_between_consecutive_chunks() {
        let text = "0123456789".repeat(10);
        let chunks = chunker(30, 10, 5).chunk(&doc(&text));
        for pair in chunks.windows(2) {
            assert!(pair[0].end >= pair[1].start + 10);
            assert!(pair[1].start > pair[0].start);
        }
    }

    #[test]
    fn test_multibyte_text_not_split_mid_codepoint() {
        let text = "héllo wörld ✓✓✓ ünïcödé".repeat(5);
        let chunks = chunker(7, 2, 1).chunk(&doc(&text));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 7));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_page_attribution() {
        let document = Document::from_text(
            "book.pdf",
            vec![
                Page {
                    number: 1,
                    text: "aaaaa".into(),
                },
                Page {
                    number: 2,
                    text: "bbbbb".into(),
                },
                Page {
                    number: 3,
                    text: "ccccc".into(),
                },
            ],
        );
        // text = "aaaaa\nbbbbb\nccccc" (17 chars)
        let chunks = chunker(8, 2, 1).chunk(&document);
        // spans: (0, 8), (6, 14), (12, 17)
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].pages, vec![1, 2]);
        assert_eq!(chunks[1].pages, vec![2, 3]);
        assert_eq!(chunks[2].pages, vec![3]);
    }

    #[test]
    fn test_chunk_ids_unique_and_stable() {
        let text = "lorem ipsum dolor sit amet ".repeat(20);
        let a = chunker(50, 10, 5).chunk(&doc(&text));
        let b = chunker(50, 10, 5).chunk(&doc(&text));
        assert_eq!(a, b);
        let mut ids: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), a.len());
    }

    fn config_strategy() -> impl Strategy<Value = ChunkingConfig> {
        (1usize..60)
            .prop_flat_map(|max| (Just(max), 0..max, 0..=max))
            .prop_map(|(max_size, overlap, min_size)| ChunkingConfig {
                max_size,
                overlap,
                min_size,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_reconstruct_original_text(
            text in "[a-z é✓\n]{0,400}",
            config in config_strategy(),
        ) {
            let chunker = Chunker::new(config).unwrap();
            let document = doc(&text);
            let chunks = chunker.chunk(&document);
            prop_assert_eq!(reconstruct(&chunks), document.text());
        }

        #[test]
        fn chunk_sizes_within_bounds(
            text in "[a-z ]{0,400}",
            config in config_strategy(),
        ) {
            let chunks = Chunker::new(config).unwrap().chunk(&doc(&text));
            let len = text.chars().count();
            for c in &chunks {
                let n = c.text.chars().count();
                prop_assert!(n <= config.max_size);
                if len >= config.min_size {
                    prop_assert!(n >= config.min_size);
                }
            }
            for (i, c) in chunks.iter().enumerate() {
                prop_assert_eq!(c.chunk_index as usize, i);
            }
        }

        #[test]
        fn chunking_is_deterministic(
            text in "[a-z ]{0,300}",
            config in config_strategy(),
        ) {
            let chunker = Chunker::new(config).unwrap();
            prop_assert_eq!(chunker.chunk(&doc(&text)), chunker.chunk(&doc(&text)));
        }
    }
}
