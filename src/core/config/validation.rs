use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(anthropic) = expect_optional_object(root, "anthropic")? {
        validate_optional_string_field(anthropic, "anthropic.api_key", "api_key")?;
        validate_non_empty_string_field(anthropic, "anthropic.model", "model")?;
        validate_non_empty_string_field(anthropic, "anthropic.base_url", "base_url")?;
        validate_u64_field(anthropic, "anthropic.max_tokens", "max_tokens", 1, 200_000)?;
        validate_f64_field(anthropic, "anthropic.temperature", "temperature", 0.0, 1.0)?;
        validate_u64_field(anthropic, "anthropic.timeout_secs", "timeout_secs", 1, 3_600)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_enum_field(
            embedding,
            "embedding.provider",
            "provider",
            &["http", "hashing", "fastembed"],
        )?;
        validate_non_empty_string_field(embedding, "embedding.model", "model")?;
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_u64_field(embedding, "embedding.dimension", "dimension", 1, 16_384)?;
        validate_u64_field(embedding, "embedding.batch_size", "batch_size", 1, 4_096)?;
        validate_u64_field(embedding, "embedding.timeout_secs", "timeout_secs", 1, 3_600)?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_u64_field(rag, "rag.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(rag, "rag.chunk_overlap", "chunk_overlap", 0, 1_000_000)?;
        validate_u64_field(rag, "rag.max_results", "max_results", 1, 1_000)?;
        validate_u64_field(rag, "rag.max_history", "max_history", 0, 1_000)?;
        validate_u64_field(rag, "rag.max_tool_rounds", "max_tool_rounds", 1, 10)?;
        validate_f64_field(
            rag,
            "rag.course_match_threshold",
            "course_match_threshold",
            -1.0,
            1.0,
        )?;

        let chunk_size = rag.get("chunk_size").and_then(Value::as_u64).unwrap_or(800);
        let chunk_overlap = rag.get("chunk_overlap").and_then(Value::as_u64).unwrap_or(100);
        if chunk_overlap >= chunk_size {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at 'rag.chunk_overlap': must be smaller than rag.chunk_size ({})",
                chunk_size
            )));
        }
    }

    if let Some(documents) = expect_optional_object(root, "documents")? {
        validate_non_empty_string_field(documents, "documents.path", "path")?;
        validate_bool_field(documents, "documents.load_on_startup", "load_on_startup")?;
        validate_bool_field(documents, "documents.clear_existing", "clear_existing")?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(logging) = expect_optional_object(root, "logging")? {
        validate_optional_string_field(logging, "logging.filter", "filter")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "non-negative integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if allowed.contains(&text) {
        return Ok(());
    }
    Err(ApiError::BadRequest(format!(
        "Invalid config at '{}': expected one of {}",
        path,
        allowed.join(", ")
    )))
}

fn validate_non_empty_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
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
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_and_default_shaped_config() {
        assert!(validate_config(&json!({})).is_ok());
        assert!(validate_config(&json!({
            "anthropic": { "model": "claude", "max_tokens": 800, "temperature": 0 },
            "rag": { "chunk_size": 800, "chunk_overlap": 100, "max_results": 5 },
            "server": { "port": 8000, "cors_allowed_origins": ["http://localhost:3000"] }
        }))
        .is_ok());
    }

    #[test]
    fn rejects_zero_max_results() {
        let err = validate_config(&json!({ "rag": { "max_results": 0 } })).unwrap_err();
        assert!(err.to_string().contains("rag.max_results"));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let err = validate_config(&json!({ "rag": { "chunk_size": 100, "chunk_overlap": 100 } }))
            .unwrap_err();
        assert!(err.to_string().contains("rag.chunk_overlap"));
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        assert!(validate_config(&json!({ "embedding": { "provider": "chroma" } })).is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(validate_config(&json!({ "anthropic": { "temperature": 1.5 } })).is_err());
    }

    #[test]
    fn rejects_wrong_section_type() {
        let err = validate_config(&json!({ "server": "localhost" })).unwrap_err();
        assert!(err.to_string().contains("expected object"));
    }
}
