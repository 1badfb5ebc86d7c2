use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::{KnowledgeBase, KnowledgeBaseName, KnowledgeError};
use crate::corpus::CorpusExtractor;
use crate::index::{ChunkingIndexer, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KnowledgeBaseState {
    Uninitialized,
    Ready,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseSnapshot {
    pub name: KnowledgeBaseName,
    pub state: KnowledgeBaseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<DateTime<Utc>>,
}

/// Outcome of [`KnowledgeBaseManager::rebuild_all`], in rebuild order.
#[derive(Debug, Default)]
pub struct RebuildReport {
    pub rebuilt: Vec<KnowledgeBaseName>,
    pub failed: Vec<(KnowledgeBaseName, KnowledgeError)>,
}

impl RebuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_names(&self) -> Vec<KnowledgeBaseName> {
        self.failed.iter().map(|(name, _)| *name).collect()
    }
}

type Slot = RwLock<Option<Arc<KnowledgeBase>>>;

/// Holds the live instance of every knowledge base.
///
/// Slot locks are held only to clone or swap the `Arc`. Builds run outside
/// them and are serialized by `build_lock`.
pub struct KnowledgeBaseManager {
    index_dir: PathBuf,
    extractor: Arc<dyn CorpusExtractor>,
    indexer: ChunkingIndexer,
    faq: Slot,
    tickets: Slot,
    build_lock: Mutex<()>,
}

impl KnowledgeBaseManager {
    pub fn new(
        index_dir: impl Into<PathBuf>,
        extractor: Arc<dyn CorpusExtractor>,
        indexer: ChunkingIndexer,
    ) -> Self {
        Self {
            index_dir: index_dir.into(),
            extractor,
            indexer,
            faq: RwLock::new(None),
            tickets: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn persist_path(&self, name: KnowledgeBaseName) -> PathBuf {
        self.index_dir.join(name.as_str())
    }

    fn slot(&self, name: KnowledgeBaseName) -> &Slot {
        match name {
            KnowledgeBaseName::Faq => &self.faq,
            KnowledgeBaseName::Tickets => &self.tickets,
        }
    }

    fn install(&self, knowledge_base: Arc<KnowledgeBase>) -> Option<Arc<KnowledgeBase>> {
        let mut guard = self
            .slot(knowledge_base.name())
            .write()
            .unwrap_or_else(|e| e.into_inner());
        guard.replace(knowledge_base)
    }

    /// Loads or builds every knowledge base. Any failure is fatal to start-up.
    pub async fn initialize(&self) -> Result<(), KnowledgeError> {
        let _build = self.build_lock.lock().await;

        for name in KnowledgeBaseName::ALL {
            let path = self.persist_path(name);
            let knowledge_base = match self.load_existing(name, &path).await {
                Some(knowledge_base) => knowledge_base,
                None => self.build(name, &path).await?,
            };
            tracing::info!(
                knowledge_base = %name,
                chunks = knowledge_base.index().len(),
                generation = %knowledge_base.index().manifest().generation,
                "Knowledge base ready"
            );
            self.install(Arc::new(knowledge_base));
        }

        Ok(())
    }

    /// A persisted index that cannot be used is reported and treated as
    /// absent so the caller builds a fresh one.
    async fn load_existing(&self, name: KnowledgeBaseName, path: &Path) -> Option<KnowledgeBase> {
        if !VectorIndex::exists(path) {
            tracing::info!(knowledge_base = %name, "No persisted index, building");
            return None;
        }

        match self.indexer.load(path).await {
            Ok(index) if index.manifest().embedding_model == self.indexer.embedder().model_id() => {
                Some(self.wrap(name, index))
            }
            Ok(index) => {
                tracing::warn!(
                    knowledge_base = %name,
                    persisted = %index.manifest().embedding_model,
                    configured = %self.indexer.embedder().model_id(),
                    "Persisted index was built with another embedding model, rebuilding"
                );
                None
            }
            Err(err) => {
                tracing::warn!(
                    knowledge_base = %name,
                    error = %err,
                    "Failed to load persisted index, rebuilding"
                );
                None
            }
        }
    }

    async fn build(&self, name: KnowledgeBaseName, path: &Path) -> Result<KnowledgeBase, KnowledgeError> {
        let corpus = name.corpus();
        let documents = self.extractor.extract(corpus).await?;
        let index = self.indexer.index(corpus, &documents, path).await?;
        Ok(self.wrap(name, index))
    }

    fn wrap(&self, name: KnowledgeBaseName, index: VectorIndex) -> KnowledgeBase {
        KnowledgeBase::new(name, index, Arc::clone(self.indexer.embedder()))
    }

    /// The live instance for `name`.
    pub fn get(&self, name: KnowledgeBaseName) -> Result<Arc<KnowledgeBase>, KnowledgeError> {
        let guard = self.slot(name).read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or(KnowledgeError::NotReady(name))
    }

    pub fn state(&self, name: KnowledgeBaseName) -> KnowledgeBaseState {
        let guard = self.slot(name).read().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            KnowledgeBaseState::Ready
        } else {
            KnowledgeBaseState::Uninitialized
        }
    }

    /// Rebuilds `name` from the current corpus contents and swaps it in.
    /// On failure the previous instance stays live.
    pub async fn rebuild(&self, name: KnowledgeBaseName) -> Result<Arc<KnowledgeBase>, KnowledgeError> {
        let _build = self.build_lock.lock().await;
        let path = self.persist_path(name);

        let knowledge_base = match self.build(name, &path).await {
            Ok(knowledge_base) => Arc::new(knowledge_base),
            Err(err) => {
                tracing::error!(knowledge_base = %name, error = %err, "Rebuild failed, keeping previous index");
                return Err(KnowledgeError::rebuild(name, err));
            }
        };

        let previous = self.install(Arc::clone(&knowledge_base));
        tracing::info!(
            knowledge_base = %name,
            chunks = knowledge_base.index().len(),
            generation = %knowledge_base.index().manifest().generation,
            previous = previous
                .as_ref()
                .map(|kb| kb.index().manifest().generation.as_str())
                .unwrap_or("none"),
            "Knowledge base rebuilt"
        );
        Ok(knowledge_base)
    }

    /// Rebuilds every knowledge base in order. A failure does not stop the
    /// remaining rebuilds.
    pub async fn rebuild_all(&self) -> RebuildReport {
        let mut report = RebuildReport::default();
        for name in KnowledgeBaseName::ALL {
            match self.rebuild(name).await {
                Ok(_) => report.rebuilt.push(name),
                Err(err) => report.failed.push((name, err)),
            }
        }
        report
    }

    pub fn snapshot(&self) -> Vec<KnowledgeBaseSnapshot> {
        KnowledgeBaseName::ALL
            .into_iter()
            .map(|name| match self.get(name) {
                Ok(knowledge_base) => {
                    let manifest = knowledge_base.index().manifest();
                    KnowledgeBaseSnapshot {
                        name,
                        state: KnowledgeBaseState::Ready,
                        generation: Some(manifest.generation.clone()),
                        document_count: Some(manifest.document_count),
                        chunk_count: Some(manifest.chunk_count),
                        corpus_digest: Some(manifest.corpus_digest.clone()),
                        built_at: Some(manifest.built_at),
                    }
                }
                Err(_) => KnowledgeBaseSnapshot {
                    name,
                    state: KnowledgeBaseState::Uninitialized,
                    generation: None,
                    document_count: None,
                    chunk_count: None,
                    corpus_digest: None,
                    built_at: None,
                },
            })
            .collect()
    }
}
