use serde::{Deserialize, Serialize};

use super::paths::AppPaths;

/// Typed view of the effective configuration (file merged with environment).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub indexing: IndexingSettings,
    pub retrieval: RetrievalSettings,
    pub prompt: PromptSettings,
    pub recorder: RecorderSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Backing-store connection URLs. `None` falls back to a SQLite file in the
/// data directory named after the original databases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub faq_url: Option<String>,
    pub ticketing_url: Option<String>,
}

impl DatabaseSettings {
    pub fn faq_url(&self, paths: &AppPaths) -> String {
        self.faq_url
            .clone()
            .unwrap_or_else(|| paths.default_database_url("ecommerce_faq"))
    }

    pub fn ticketing_url(&self, paths: &AppPaths) -> String {
        self.ticketing_url
            .clone()
            .unwrap_or_else(|| paths.default_database_url("ecommerce_ticketing"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Http,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Only used by the hashing embedder.
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Http,
            base_url: "http://127.0.0.1:8090".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            api_key: None,
            dimension: 384,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8088".to_string(),
            model: "local-model".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    pub embed_batch_size: usize,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            embed_batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub max_context_chars: usize,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            max_context_chars: 6000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    pub queue_capacity: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}
