use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::persist::{self, IndexManifest};
use super::splitter::{Chunk, TextSplitter};
use super::store::{IndexedChunk, VectorIndex};
use super::IndexError;
use crate::corpus::{Corpus, Document};
use crate::embedding::{Embedder, EmbeddingError};

const DEFAULT_BATCH_SIZE: usize = 32;

/// Splits documents, embeds every chunk and persists the result as a new
/// index generation.
#[derive(Clone)]
pub struct ChunkingIndexer {
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl ChunkingIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            splitter: TextSplitter::default(),
            embedder,
            batch_size: if batch_size == 0 {
                DEFAULT_BATCH_SIZE
            } else {
                batch_size
            },
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Chunks in document order, then chunk order.
    pub fn chunk_documents(&self, corpus: Corpus, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .enumerate()
            .flat_map(|(document_index, document)| {
                self.splitter
                    .split(&document.content)
                    .into_iter()
                    .enumerate()
                    .map(move |(chunk_index, content)| Chunk {
                        corpus,
                        document_index,
                        chunk_index,
                        content: content.to_string(),
                    })
            })
            .collect()
    }

    /// Builds a fresh generation under `persist_path`. Nothing is written
    /// until every chunk has been embedded, and the manifest only moves once
    /// the generation file is complete; a failed build leaves the previous
    /// generation in place.
    pub async fn index(
        &self,
        corpus: Corpus,
        documents: &[Document],
        persist_path: &Path,
    ) -> Result<VectorIndex, IndexError> {
        let chunks = self.chunk_documents(corpus, documents);
        let previous = persist::read_manifest(persist_path).await.ok();

        let mut entries = Vec::with_capacity(chunks.len());
        let mut dimension = None;

        for batch in chunks.chunks(self.batch_size) {
            let inputs: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let embeddings = self.embedder.embed(&inputs).await?;
            if embeddings.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                ))
                .into());
            }

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                let expected = *dimension.get_or_insert(embedding.len());
                if embedding.len() != expected || expected == 0 {
                    return Err(EmbeddingError::InvalidResponse(format!(
                        "embedding dimension {} differs from {}",
                        embedding.len(),
                        expected
                    ))
                    .into());
                }
                entries.push(IndexedChunk {
                    chunk: chunk.clone(),
                    embedding,
                });
            }
        }

        let manifest = IndexManifest::new(
            corpus,
            self.embedder.model_id(),
            dimension.unwrap_or(0),
            documents.len(),
            entries.len(),
            &corpus_digest(documents),
        );
        let index = VectorIndex::persist(persist_path, manifest, entries).await?;

        let mut keep = vec![index.manifest().generation.as_str()];
        if let Some(previous) = &previous {
            keep.push(previous.generation.as_str());
        }
        persist::prune_generations(persist_path, &keep).await;

        tracing::info!(
            corpus = %corpus,
            documents = documents.len(),
            chunks = index.len(),
            generation = %index.manifest().generation,
            path = %persist_path.display(),
            "Built vector index"
        );
        Ok(index)
    }

    pub async fn load(&self, persist_path: &Path) -> Result<VectorIndex, IndexError> {
        VectorIndex::load(persist_path).await
    }
}

fn corpus_digest(documents: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for document in documents {
        hasher.update((document.content.len() as u64).to_le_bytes());
        hasher.update(document.content.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_id(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Request("connection refused".to_string()))
        }
    }

    fn indexer() -> ChunkingIndexer {
        ChunkingIndexer::new(Arc::new(HashingEmbedder::new(64)), 2)
    }

    fn documents() -> Vec<Document> {
        vec![
            Document::new(Corpus::Faq, "Question: Where is my order?\nAnswer: Tracking page."),
            Document::new(Corpus::Faq, "x".repeat(2500)),
            Document::new(Corpus::Faq, "Question: Refunds?\nAnswer: Within 30 days."),
        ]
    }

    #[test]
    fn chunk_documents_keeps_document_then_chunk_order() {
        let chunks = indexer().chunk_documents(Corpus::Faq, &documents());

        let positions: Vec<(usize, usize)> = chunks
            .iter()
            .map(|c| (c.document_index, c.chunk_index))
            .collect();
        assert_eq!(positions, vec![(0, 0), (1, 0), (1, 1), (1, 2), (2, 0)]);
        assert_eq!(chunks[3].content.len(), 500);
    }

    #[tokio::test]
    async fn loaded_index_answers_like_the_built_one() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("faq");
        let indexer = indexer();

        let built = indexer.index(Corpus::Faq, &documents(), &dir).await.unwrap();
        let loaded = indexer.load(&dir).await.unwrap();

        assert_eq!(built.manifest(), loaded.manifest());
        assert_eq!(loaded.manifest().document_count, 3);
        assert_eq!(loaded.manifest().chunk_count, 5);
        assert_eq!(loaded.manifest().embedding_model, "hashing-64");

        let query = indexer
            .embedder()
            .embed(&["where is my order".to_string()])
            .await
            .unwrap()
            .remove(0);
        assert_eq!(built.search(&query, 3), loaded.search(&query, 3));
        assert_eq!(
            loaded.search(&query, 1)[0].chunk.content,
            "Question: Where is my order?\nAnswer: Tracking page."
        );
    }

    #[tokio::test]
    async fn empty_corpus_builds_an_empty_index() {
        let tmp = tempfile::tempdir().unwrap();
        let index = indexer().index(Corpus::Ticket, &[], tmp.path()).await.unwrap();

        assert!(index.is_empty());
        assert!(index.search(&[1.0; 64], 2).is_empty());
        assert!(VectorIndex::exists(tmp.path()));
    }

    #[tokio::test]
    async fn failed_build_leaves_previous_generation_live() {
        let tmp = tempfile::tempdir().unwrap();
        let good = indexer().index(Corpus::Faq, &documents(), tmp.path()).await.unwrap();

        let failing = ChunkingIndexer::new(Arc::new(FailingEmbedder), 8);
        let err = failing
            .index(Corpus::Faq, &documents(), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));

        let loaded = VectorIndex::load(tmp.path()).await.unwrap();
        assert_eq!(loaded.manifest(), good.manifest());
    }

    #[tokio::test]
    async fn rebuilds_prune_all_but_two_generations() {
        let tmp = tempfile::tempdir().unwrap();
        let indexer = indexer();
        for _ in 0..4 {
            indexer.index(Corpus::Faq, &documents(), tmp.path()).await.unwrap();
        }

        let mut generations = 0;
        for entry in std::fs::read_dir(tmp.path()).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            if name.ends_with(".sqlite3") {
                generations += 1;
            }
        }
        assert_eq!(generations, 2);
    }

    #[test]
    fn digest_depends_on_content_and_boundaries() {
        let a = corpus_digest(&[Document::new(Corpus::Faq, "ab"), Document::new(Corpus::Faq, "c")]);
        let b = corpus_digest(&[Document::new(Corpus::Faq, "a"), Document::new(Corpus::Faq, "bc")]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
