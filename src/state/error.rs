use thiserror::Error;

use crate::core::config::ConfigError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initialize embedder: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("Failed to initialize knowledge bases: {0}")]
    KnowledgeBase(#[source] anyhow::Error),

    #[error("Failed to initialize LLM provider: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to initialize interaction recorder: {0}")]
    Recorder(#[source] anyhow::Error),
}
