use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Embedder, EmbeddingError};

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint
/// (llama.cpp server, LM Studio, text-embeddings-inference, ...).
#[derive(Clone)]
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EmbeddingError::Request(err.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client,
        })
    }
}

fn embeddings_body(model: &str, inputs: &[String]) -> Value {
    json!({
        "model": model,
        "input": inputs,
    })
}

/// Vectors in input order. Items are placed by their `index` when every item
/// carries one; otherwise response order is kept.
fn embeddings_from_payload(expected: usize, payload: Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let response: EmbeddingsResponse = serde_json::from_value(payload)
        .map_err(|err| EmbeddingError::InvalidResponse(err.to_string()))?;

    let items = response.data;
    if items.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            items.len()
        )));
    }

    if items.iter().any(|item| item.index.is_none()) {
        return Ok(items.into_iter().map(|item| item.embedding).collect());
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in items {
        let index = item.index.unwrap_or(usize::MAX);
        let Some(slot) = slots.get_mut(index) else {
            return Err(EmbeddingError::InvalidResponse(format!(
                "embedding index {} out of range",
                index
            )));
        };
        if slot.is_some() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "duplicate embedding index {}",
                index
            )));
        }
        *slot = Some(item.embedding);
    }

    Ok(slots.into_iter().flatten().collect())
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = embeddings_body(&self.model, inputs);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request
            .send()
            .await
            .map_err(|err| EmbeddingError::Request(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(EmbeddingError::Request(format!("{}: {}", status, text)));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| EmbeddingError::InvalidResponse(err.to_string()))?;

        embeddings_from_payload(inputs.len(), payload)
    }
}
