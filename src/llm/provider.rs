use async_trait::async_trait;

use super::error::GenerationError;
use super::types::CompletionRequest;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai_compat")
    fn name(&self) -> &str;

    /// check if the provider is reachable
    async fn health_check(&self) -> bool;

    /// raw text continuation of the prompt (non-streaming)
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError>;
}
