//! Embedding capability used by the indexer and at query time.

mod hashing;
mod http;
mod query;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::config::settings::EmbeddingSettings;
use crate::core::config::EmbeddingProviderKind;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;
pub use query::EmbeddedQuery;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded in index manifests. An index built under a
    /// different identifier holds incompatible vectors.
    fn model_id(&self) -> &str;

    /// Embeds each input; output order matches input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match settings.provider {
        EmbeddingProviderKind::Http => Ok(Arc::new(HttpEmbedder::new(
            &settings.base_url,
            &settings.model,
            settings.api_key.clone(),
            Duration::from_secs(settings.timeout_secs),
        )?)),
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimension))),
    }
}
