use std::sync::Arc;

use super::{KnowledgeBaseName, KnowledgeError};
use crate::embedding::{EmbeddedQuery, Embedder};
use crate::index::{ScoredChunk, VectorIndex};

/// One live, immutable knowledge base. Rebuilds produce a new instance;
/// requests holding the old `Arc` finish against it.
pub struct KnowledgeBase {
    name: KnowledgeBaseName,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeBase {
    pub fn new(name: KnowledgeBaseName, index: VectorIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            name,
            index,
            embedder,
        }
    }

    pub fn name(&self) -> KnowledgeBaseName {
        self.name
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Top-`k` chunks for `query`, most similar first.
    pub async fn retrieve(
        &self,
        query: &EmbeddedQuery,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, KnowledgeError> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = query.embedding(self.embedder.as_ref()).await?;
        Ok(self.index.search(&query_embedding, k))
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("name", &self.name)
            .field("generation", &self.index.manifest().generation)
            .field("chunks", &self.index.len())
            .finish()
    }
}
