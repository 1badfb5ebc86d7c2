use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::persist::{self, IndexManifest};
use super::splitter::Chunk;
use super::IndexError;

/// A chunk together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// In-memory brute-force cosine index backed by one persisted generation.
///
/// The whole generation is read into memory on load; the SQLite file is not
/// held open afterwards, so old generations can be pruned while a replaced
/// index is still serving in-flight requests.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub(crate) fn from_parts(manifest: IndexManifest, entries: Vec<IndexedChunk>) -> Self {
        Self { manifest, entries }
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `dir` holds a readable manifest.
    pub fn exists(dir: &Path) -> bool {
        persist::manifest_path(dir).is_file()
    }

    /// Writes a new generation under `dir` and points the manifest at it.
    pub async fn persist(
        dir: &Path,
        manifest: IndexManifest,
        entries: Vec<IndexedChunk>,
    ) -> Result<Self, IndexError> {
        persist::write_generation(dir, &manifest, &entries).await?;
        persist::write_manifest(dir, &manifest).await?;
        Ok(Self::from_parts(manifest, entries))
    }

    /// Reads the generation the manifest in `dir` points at.
    pub async fn load(dir: &Path) -> Result<Self, IndexError> {
        let manifest = persist::read_manifest(dir).await?;
        let entries = persist::read_generation(dir, &manifest).await?;
        Ok(Self::from_parts(manifest, entries))
    }

    /// Top-k chunks by cosine similarity, best first. Equal scores keep
    /// insertion order.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredChunk> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(query_embedding, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(position, score)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;

    fn entry(position: usize, content: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk {
                corpus: Corpus::Faq,
                document_index: position,
                chunk_index: 0,
                content: content.to_string(),
            },
            embedding,
        }
    }

    fn index(entries: Vec<IndexedChunk>) -> VectorIndex {
        let manifest = IndexManifest::new(Corpus::Faq, "test-model", 2, 0, entries.len(), "");
        VectorIndex::from_parts(manifest, entries)
    }

    #[test]
    fn cosine_handles_identity_orthogonality_and_mismatch() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn search_returns_top_k_best_first() {
        let index = index(vec![
            entry(0, "orthogonal", vec![0.0, 1.0]),
            entry(1, "exact", vec![1.0, 0.0]),
            entry(2, "close", vec![0.9, 0.1]),
        ]);

        let results = index.search(&[1.0, 0.0], 2);

        let contents: Vec<&str> = results.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(contents, vec!["exact", "close"]);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn ties_keep_insertion_order_and_zero_k_is_empty() {
        let index = index(vec![
            entry(0, "first", vec![1.0, 0.0]),
            entry(1, "second", vec![1.0, 0.0]),
        ]);

        let results = index.search(&[1.0, 0.0], 5);
        assert_eq!(results[0].chunk.content, "first");
        assert_eq!(results[1].chunk.content, "second");
        assert!(index.search(&[1.0, 0.0], 0).is_empty());
    }
}
