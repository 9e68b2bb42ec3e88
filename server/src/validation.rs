use crate::config::{EmptyTextPolicy, ServerConfig};
use crate::error::ApiError;

/// How a `/tts` request should be served after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecision {
    Synthesize,
    Silence,
}

/// Pull `text` out of a request body without rejecting anything.
///
/// Bodies that are not JSON objects, or objects without `text`, yield an
/// empty string. Scalars are coerced (`{"text": 42}` reads as `"42"`).
pub fn text_from_body(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return String::new();
    };
    match value.get("text") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Validate normalized text against the configured policy.
pub fn validate_tts_text(text: &str, config: &ServerConfig) -> Result<TextDecision, ApiError> {
    if text.is_empty() {
        return match config.empty_text {
            EmptyTextPolicy::Reject => Err(ApiError::InvalidInput("text is required".to_string())),
            EmptyTextPolicy::Silence => Ok(TextDecision::Silence),
        };
    }
    if config.max_text_chars > 0 && text.chars().count() > config.max_text_chars {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            config.max_text_chars
        )));
    }
    Ok(TextDecision::Synthesize)
}
