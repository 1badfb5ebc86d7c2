use serde_json::{Map, Value};

use super::service::ConfigError;

const EMBEDDING_PROVIDERS: [&str; 2] = ["http", "hashing"];

pub fn validate_config(config: &Value) -> Result<(), ConfigError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(database) = expect_optional_object(root, "database")? {
        validate_optional_string_field(database, "database.faq_url", "faq_url")?;
        validate_optional_string_field(database, "database.ticketing_url", "ticketing_url")?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_choice_field(
            embedding,
            "embedding.provider",
            "provider",
            &EMBEDDING_PROVIDERS,
        )?;
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimension", "dimension", 1, 65_536)?;
        validate_u64_field(embedding, "embedding.timeout_secs", "timeout_secs", 1, 3_600)?;
    }

    if let Some(generation) = expect_optional_object(root, "generation")? {
        validate_optional_string_field(generation, "generation.base_url", "base_url")?;
        validate_optional_string_field(generation, "generation.model", "model")?;
        validate_u64_field(
            generation,
            "generation.timeout_secs",
            "timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(indexing) = expect_optional_object(root, "indexing")? {
        validate_u64_field(
            indexing,
            "indexing.embed_batch_size",
            "embed_batch_size",
            1,
            4_096,
        )?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
    }

    if let Some(prompt) = expect_optional_object(root, "prompt")? {
        validate_u64_field(
            prompt,
            "prompt.max_context_chars",
            "max_context_chars",
            100,
            1_000_000,
        )?;
    }

    if let Some(recorder) = expect_optional_object(root, "recorder")? {
        validate_u64_field(
            recorder,
            "recorder.queue_capacity",
            "queue_capacity",
            1,
            1_000_000,
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ConfigError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ConfigError::Invalid(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() {
        return Ok(());
    }
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_choice_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    choices: &[&str],
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !choices.contains(&text) {
        return Err(ConfigError::Invalid(format!(
            "Invalid config at '{}': expected one of {}",
            path,
            choices.join(", ")
        )));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ConfigError {
    ConfigError::Invalid(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
