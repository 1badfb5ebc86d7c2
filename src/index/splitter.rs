use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;

/// Maximum chunk length in characters.
pub const CHUNK_SIZE: usize = 1000;

/// Slice of one document's content; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub corpus: Corpus,
    /// Position of the source document in its extraction.
    pub document_index: usize,
    /// Position of this chunk within its document.
    pub chunk_index: usize,
    pub content: String,
}

/// Greedy fixed-width splitter with no overlap.
///
/// Every chunk except the last holds exactly `chunk_size` characters, so
/// joining a document's chunks in order reproduces it byte for byte.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut count = 0;

        for (offset, _) in text.char_indices() {
            if count == self.chunk_size {
                chunks.push(&text[start..offset]);
                start = offset;
                count = 0;
            }
            count += 1;
        }

        if start < text.len() {
            chunks.push(&text[start..]);
        }

        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(CHUNK_SIZE)
    }
}
