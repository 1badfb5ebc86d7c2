use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;

use super::{PartialRetrievalWarning, RetrievalError, RetrievalResult, Retriever};
use crate::embedding::EmbeddedQuery;
use crate::knowledge::{KnowledgeBaseManager, KnowledgeBaseName};

use super::KnowledgeBaseRetriever;

/// Concatenates the results of its children in child order. Scores are not
/// normalized across children. Children share the query, so its embedding
/// is computed once per request.
pub struct CombinedRetriever {
    children: Vec<Arc<dyn Retriever>>,
}

impl CombinedRetriever {
    pub fn new(children: Vec<Arc<dyn Retriever>>) -> Self {
        Self { children }
    }

    /// FAQ first, then tickets.
    pub fn for_knowledge_bases(manager: Arc<KnowledgeBaseManager>) -> Self {
        Self::new(
            KnowledgeBaseName::ALL
                .into_iter()
                .map(|name| {
                    Arc::new(KnowledgeBaseRetriever::new(name, Arc::clone(&manager)))
                        as Arc<dyn Retriever>
                })
                .collect(),
        )
    }
}

#[async_trait]
impl Retriever for CombinedRetriever {
    fn name(&self) -> &str {
        "combined"
    }

    async fn retrieve(
        &self,
        query: &EmbeddedQuery,
        k: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let outcomes = join_all(
            self.children
                .iter()
                .map(|child| child.retrieve(query, k)),
        )
        .await;

        let mut combined = RetrievalResult::default();
        let mut succeeded = 0;

        for (child, outcome) in self.children.iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    succeeded += 1;
                    combined.documents.extend(result.documents);
                    combined.warnings.extend(result.warnings);
                }
                Err(err) => {
                    tracing::warn!(source = child.name(), error = %err, "Partial retrieval");
                    combined.warnings.push(PartialRetrievalWarning {
                        source: child.name().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if succeeded == 0 && !self.children.is_empty() {
            return Err(RetrievalError::NoSources(combined.warnings));
        }

        Ok(combined)
    }
}
