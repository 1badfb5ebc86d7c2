//! Chunking, embedding and persistence of per-corpus vector indices.

mod indexer;
mod persist;
mod splitter;
mod store;

use std::path::PathBuf;

use thiserror::Error;

use crate::embedding::EmbeddingError;

pub use indexer::ChunkingIndexer;
pub use persist::{IndexManifest, MANIFEST_FILE};
pub use splitter::{Chunk, TextSplitter, CHUNK_SIZE};
pub use store::{cosine_similarity, IndexedChunk, ScoredChunk, VectorIndex};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no persisted index at {0}")]
    Missing(PathBuf),
    #[error("index I/O error at {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("index storage error: {0}")]
    Storage(String),
    #[error("corrupt index: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        IndexError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        IndexError::Storage(err.to_string())
    }
}
