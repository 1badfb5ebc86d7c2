use std::borrow::Cow;

use tokio::sync::OnceCell;

use super::{Embedder, EmbeddingError};

/// A question whose embedding is computed once and shared by every index
/// searched for it. The cached vector is only reused for the model that
/// produced it.
#[derive(Debug)]
pub struct EmbeddedQuery {
    text: String,
    cached: OnceCell<(String, Vec<f32>)>,
}

impl EmbeddedQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cached: OnceCell::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub async fn embedding(&self, embedder: &dyn Embedder) -> Result<Cow<'_, [f32]>, EmbeddingError> {
        let (model_id, vector) = self
            .cached
            .get_or_try_init(|| async {
                let vector = embed_one(embedder, &self.text).await?;
                Ok::<_, EmbeddingError>((embedder.model_id().to_string(), vector))
            })
            .await?;

        if model_id == embedder.model_id() {
            return Ok(Cow::Borrowed(vector.as_slice()));
        }
        embed_one(embedder, &self.text).await.map(Cow::Owned)
    }
}

async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let mut embeddings = embedder.embed(&[text.to_string()]).await?;
    embeddings
        .pop()
        .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding for query".to_string()))
}
