use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::error::GenerationError;
use super::provider::LlmProvider;
use super::types::CompletionRequest;

/// Text completion against an OpenAI-compatible server (llama.cpp server,
/// LM Studio, vLLM, ...).
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GenerationError::Unavailable(err.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client,
        })
    }
}

fn completion_body(model: &str, request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": model,
        "prompt": request.prompt,
        "max_tokens": request.params.max_new_tokens,
        "stream": false,
    });

    if let Some(obj) = body.as_object_mut() {
        if request.params.do_sample {
            obj.insert("temperature".to_string(), json!(request.params.temperature));
        } else {
            obj.insert("temperature".to_string(), json!(0.0));
        }
    }

    body
}

fn completion_text(payload: &Value) -> Result<String, GenerationError> {
    payload["choices"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            GenerationError::Unavailable("completion response has no choices[0].text".to_string())
        })
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
        let url = format!("{}/v1/completions", self.base_url);
        let body = completion_body(&self.model, &request);

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let res = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                GenerationError::Timeout(Duration::ZERO)
            } else {
                GenerationError::Unavailable(err.to_string())
            }
        })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(GenerationError::Unavailable(format!(
                "completion error {}: {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| GenerationError::Unavailable(err.to_string()))?;

        completion_text(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_fixed_decoding_parameters() {
        let body = completion_body("local-model", &CompletionRequest::new("<|user|>\nhi"));

        assert_eq!(body["model"], "local-model");
        assert_eq!(body["prompt"], "<|user|>\nhi");
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(body["stream"], false);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn reads_first_choice_text() {
        let payload = json!({ "choices": [{ "text": "  Use the reset link. " }] });
        assert_eq!(completion_text(&payload).unwrap(), "  Use the reset link. ");

        let err = completion_text(&json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let provider = OpenAiCompatProvider::new(
            "http://127.0.0.1:9",
            "local-model",
            None,
            Duration::from_secs(2),
        )
        .unwrap();

        assert!(!provider.health_check().await);
        let err = provider.complete(CompletionRequest::new("hi")).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Unavailable(_) | GenerationError::Timeout(_)
        ));
    }
}
