//! Pull a JSON object out of model output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::LlmError;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap());

/// Parse the JSON object in `text`, tolerating Markdown code fences and prose
/// around the object.
pub fn extract_json_object(text: &str) -> Result<Value, LlmError> {
    let candidate = match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => text.trim(),
    };

    let candidate = match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if start < end => &candidate[start..=end],
        _ => {
            return Err(LlmError::MalformedJson {
                reason: "no JSON object in model output".to_string(),
            });
        }
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(LlmError::MalformedJson {
            reason: "model output is not a JSON object".to_string(),
        }),
        Err(e) => Err(LlmError::MalformedJson {
            reason: e.to_string(),
        }),
    }
}
