use thiserror::Error;

use super::KnowledgeBaseName;
use crate::corpus::DataSourceError;
use crate::embedding::EmbeddingError;
use crate::index::IndexError;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("knowledge base '{0}' is not ready")]
    NotReady(KnowledgeBaseName),

    #[error("rebuild of knowledge base '{name}' failed: {source}")]
    Rebuild {
        name: KnowledgeBaseName,
        #[source]
        source: Box<KnowledgeError>,
    },
}

impl KnowledgeError {
    pub(crate) fn rebuild(name: KnowledgeBaseName, source: KnowledgeError) -> Self {
        KnowledgeError::Rebuild {
            name,
            source: Box::new(source),
        }
    }
}
