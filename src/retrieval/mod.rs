//! Query-time retrieval over the live knowledge bases.

mod combined;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::corpus::Corpus;
use crate::embedding::EmbeddedQuery;
use crate::knowledge::{KnowledgeBaseManager, KnowledgeBaseName, KnowledgeError};

pub use combined::CombinedRetriever;

/// One retrieved chunk of evidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub corpus: Corpus,
    pub source: String,
    pub score: f32,
}

/// Raised when one source could not contribute; the others still answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialRetrievalWarning {
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub documents: Vec<RetrievedDocument>,
    pub warnings: Vec<PartialRetrievalWarning>,
}

impl RetrievalResult {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("retrieval from '{source_name}' failed: {source}")]
    Source {
        source_name: String,
        #[source]
        source: KnowledgeError,
    },

    #[error("no knowledge base could be queried: {}", describe(.0))]
    NoSources(Vec<PartialRetrievalWarning>),
}

fn describe(warnings: &[PartialRetrievalWarning]) -> String {
    warnings
        .iter()
        .map(|w| format!("{}: {}", w.source, w.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(
        &self,
        query: &EmbeddedQuery,
        k: usize,
    ) -> Result<RetrievalResult, RetrievalError>;
}

/// Retrieves from one named knowledge base, resolving the live instance on
/// every call so that rebuilds take effect immediately.
pub struct KnowledgeBaseRetriever {
    name: KnowledgeBaseName,
    manager: Arc<KnowledgeBaseManager>,
}

impl KnowledgeBaseRetriever {
    pub fn new(name: KnowledgeBaseName, manager: Arc<KnowledgeBaseManager>) -> Self {
        Self { name, manager }
    }
}

#[async_trait]
impl Retriever for KnowledgeBaseRetriever {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn retrieve(
        &self,
        query: &EmbeddedQuery,
        k: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let source_error = |source: KnowledgeError| RetrievalError::Source {
            source_name: self.name.as_str().to_string(),
            source,
        };

        let knowledge_base = self.manager.get(self.name).map_err(source_error)?;
        let hits = knowledge_base
            .retrieve(query, k)
            .await
            .map_err(source_error)?;

        let documents = hits
            .into_iter()
            .map(|hit| RetrievedDocument {
                corpus: hit.chunk.corpus,
                content: hit.chunk.content,
                source: self.name.as_str().to_string(),
                score: hit.score,
            })
            .collect();

        Ok(RetrievalResult {
            documents,
            warnings: Vec::new(),
        })
    }
}
