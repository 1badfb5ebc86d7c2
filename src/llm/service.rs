use std::sync::Arc;
use std::time::Duration;

use super::error::GenerationError;
use super::provider::LlmProvider;
use super::types::CompletionRequest;

/// Generation Invoker: one model call per prompt with fixed decoding
/// parameters, a deadline and trimmed output. No retries.
#[derive(Clone)]
pub struct GenerationService {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl GenerationService {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = CompletionRequest::new(prompt);
        let started = std::time::Instant::now();

        let text = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(Ok(text)) => text,
            Ok(Err(GenerationError::Timeout(_))) | Err(_) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    timeout_secs = self.timeout.as_secs_f32(),
                    "Generation timed out"
                );
                return Err(GenerationError::Timeout(self.timeout));
            }
            Ok(Err(err)) => {
                tracing::warn!(provider = self.provider.name(), error = %err, "Generation failed");
                return Err(err);
            }
        };

        let answer = text.trim();
        if answer.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        tracing::debug!(
            provider = self.provider.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = answer.chars().count(),
            "Generation completed"
        );
        Ok(answer.to_string())
    }
}
