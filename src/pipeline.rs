use std::sync::Arc;

use thiserror::Error;

use crate::embedding::EmbeddedQuery;
use crate::llm::{GenerationError, GenerationService};
use crate::prompt::PromptAssembler;
use crate::retrieval::{PartialRetrievalWarning, RetrievalError, Retriever};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub response: String,
    pub warnings: Vec<PartialRetrievalWarning>,
}

/// retrieve -> assemble -> generate for a single question.
#[derive(Clone)]
pub struct AnswerPipeline {
    retriever: Arc<dyn Retriever>,
    assembler: PromptAssembler,
    generator: GenerationService,
    top_k: usize,
}

impl AnswerPipeline {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        assembler: PromptAssembler,
        generator: GenerationService,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            assembler,
            generator,
            top_k,
        }
    }

    pub fn generator(&self) -> &GenerationService {
        &self.generator
    }

    pub async fn answer(&self, query: &str) -> Result<Answer, PipelineError> {
        let evidence = self
            .retriever
            .retrieve(&EmbeddedQuery::new(query), self.top_k)
            .await?;
        let prompt = self.assembler.assemble(query, &evidence.documents);

        tracing::debug!(
            documents = evidence.documents.len(),
            partial = evidence.is_partial(),
            prompt_chars = prompt.chars().count(),
            "Assembled prompt"
        );

        let response = self.generator.generate(&prompt).await?;

        Ok(Answer {
            response,
            warnings: evidence.warnings,
        })
    }
}
