use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use super::paths::AppPaths;
use super::settings::Settings;
use super::validation::validate_config;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 2] = ["max_tokens", "max_new_tokens"];

#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Text,
    Integer,
}

/// Environment variables layered over the config file.
const ENV_OVERRIDES: [(&str, &[&str], EnvKind); 13] = [
    ("HOST", &["server", "host"], EnvKind::Text),
    ("PORT", &["server", "port"], EnvKind::Integer),
    ("FAQ_DATABASE_URL", &["database", "faq_url"], EnvKind::Text),
    (
        "TICKETING_DATABASE_URL",
        &["database", "ticketing_url"],
        EnvKind::Text,
    ),
    ("LLM_BASE_URL", &["generation", "base_url"], EnvKind::Text),
    ("LLM_MODEL", &["generation", "model"], EnvKind::Text),
    ("LLM_API_KEY", &["generation", "api_key"], EnvKind::Text),
    (
        "LLM_TIMEOUT_SECS",
        &["generation", "timeout_secs"],
        EnvKind::Integer,
    ),
    ("EMBEDDING_PROVIDER", &["embedding", "provider"], EnvKind::Text),
    ("EMBEDDING_BASE_URL", &["embedding", "base_url"], EnvKind::Text),
    ("EMBEDDING_MODEL", &["embedding", "model"], EnvKind::Text),
    ("EMBEDDING_API_KEY", &["embedding", "api_key"], EnvKind::Text),
    (
        "RETRIEVAL_TOP_K",
        &["retrieval", "top_k"],
        EnvKind::Integer,
    ),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("SUPPORT_RAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let data_config = self.paths.data_dir.join("config.yml");
        if data_config.exists() {
            return data_config;
        }

        self.paths.project_root.join("config.yml")
    }

    /// Raw configuration: the YAML file (if any) with environment overrides
    /// applied on top.
    pub fn load_config(&self) -> Result<Value, ConfigError> {
        let file_config = load_yaml_file(&self.config_path())?;
        let env_config = collect_env_overrides(|key| env::var(key).ok())?;
        Ok(deep_merge(&file_config, &env_config))
    }

    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        let config = self.load_config()?;
        settings_from_value(config)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

pub fn settings_from_value(config: Value) -> Result<Settings, ConfigError> {
    validate_config(&config)?;
    serde_json::from_value(config).map_err(|err| ConfigError::Invalid(err.to_string()))
}

fn load_yaml_file(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let value = serde_yaml::from_str::<Value>(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ConfigError::Parse {
            path: path.to_path_buf(),
            message: "top level must be a mapping".to_string(),
        }),
    }
}

fn collect_env_overrides<F>(lookup: F) -> Result<Value, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut overrides = Value::Object(Map::new());

    for (key, path, kind) in ENV_OVERRIDES {
        let Some(raw) = lookup(key) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let value = match kind {
            EnvKind::Text => Value::String(raw.to_string()),
            EnvKind::Integer => raw.parse::<u64>().map(Value::from).map_err(|_| {
                ConfigError::Invalid(format!(
                    "Invalid value for environment variable {}: expected integer, got '{}'",
                    key, raw
                ))
            })?,
        };

        set_object_path(&mut overrides, path, value);
    }

    Ok(overrides)
}

fn set_object_path(config: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = config;
    for key in parents {
        if !current.get(*key).map(|v| v.is_object()).unwrap_or(false) {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            map.insert((*key).to_string(), Value::Object(Map::new()));
        }

        let Some(next) = current.get_mut(*key) else {
            return;
        };
        current = next;
    }

    if let Some(map) = current.as_object_mut() {
        map.insert((*last).to_string(), value);
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::core::config::settings::EmbeddingProviderKind;
    use serde_json::json;

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "server": { "host": "127.0.0.1", "port": 5000 },
            "retrieval": { "top_k": 2 }
        });
        let override_value = json!({
            "server": { "port": 8080 },
            "prompt": { "max_context_chars": 1000 }
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "server": { "host": "127.0.0.1", "port": 8080 },
                "retrieval": { "top_k": 2 },
                "prompt": { "max_context_chars": 1000 }
            })
        );
    }

    #[test]
    fn env_overrides_build_nested_sections() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "8081"),
            ("FAQ_DATABASE_URL", "sqlite:///tmp/faq.db"),
            ("EMBEDDING_PROVIDER", "hashing"),
            ("LLM_MODEL", "  "),
        ]);

        let overrides =
            collect_env_overrides(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(
            overrides,
            json!({
                "server": { "port": 8081 },
                "database": { "faq_url": "sqlite:///tmp/faq.db" },
                "embedding": { "provider": "hashing" }
            })
        );
    }

    #[test]
    fn env_override_rejects_non_numeric_port() {
        let err = collect_env_overrides(|key| (key == "PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn settings_fall_back_to_defaults() {
        let settings = settings_from_value(json!({
            "embedding": { "provider": "hashing", "dimension": 64 }
        }))
        .unwrap();

        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.retrieval.top_k, 2);
        assert_eq!(settings.embedding.provider, EmbeddingProviderKind::Hashing);
        assert_eq!(settings.embedding.dimension, 64);
        assert_eq!(settings.generation.timeout_secs, 120);
    }

    #[test]
    fn load_yaml_file_reads_mapping_and_tolerates_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = load_yaml_file(&tmp.path().join("absent.yml")).unwrap();
        assert_eq!(missing, json!({}));

        let path = tmp.path().join("config.yml");
        fs::write(&path, "server:\n  port: 7000\n").unwrap();
        assert_eq!(load_yaml_file(&path).unwrap(), json!({ "server": { "port": 7000 } }));

        fs::write(&path, "- just\n- a list\n").unwrap();
        assert!(matches!(
            load_yaml_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "generation": {
                "api_key": "sk-123",
                "model": "local-model"
            },
            "database": { "password": "pw", "faq_url": "sqlite://faq.db" }
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "generation": { "api_key": "****", "model": "local-model" },
                "database": { "password": "****", "faq_url": "sqlite://faq.db" }
            })
        );
    }
}
