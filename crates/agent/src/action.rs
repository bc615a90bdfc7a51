//! Decoding an LLM reply into an [`AgentAction`].
//!
//! Models are asked for a single JSON object but routinely wrap it in a code
//! fence, write the hand-off mention after the closing brace, or emit several
//! objects back to back. Those shapes are accepted; plain prose is read as a
//! final reply. A JSON object with an unrecognised `action` tag is rejected.

use crate::mention::MENTION_REGEX;
use huddle_core::agent::AgentAction;
use huddle_core::error::ExternalCallError;
use serde_json::Value;

/// Decode raw model output.
pub fn decode_action(raw: &str) -> Result<AgentAction, ExternalCallError> {
    let cleaned = strip_code_fence(raw);

    if !cleaned.starts_with('{') {
        return Ok(AgentAction::Final {
            text: raw.trim().to_string(),
        });
    }

    let mut stream = serde_json::Deserializer::from_str(cleaned).into_iter::<Value>();
    let mut object = match stream.next() {
        Some(Ok(Value::Object(object))) => object,
        _ => {
            return Ok(AgentAction::Final {
                text: raw.trim().to_string(),
            });
        }
    };
    let trailing = cleaned[stream.byte_offset()..].trim();

    let tag = object
        .get("action")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .ok_or_else(|| ExternalCallError::MalformedAction("missing \"action\" field".into()))?;

    if !AgentAction::TAGS.contains(&tag.as_str()) {
        return Err(ExternalCallError::UnknownAction(tag));
    }
    object.insert("action".into(), Value::String(tag));

    let mut action: AgentAction = serde_json::from_value(Value::Object(object))
        .map_err(|e| ExternalCallError::MalformedAction(e.to_string()))?;

    // A mention written after the closing brace belongs to the reply text
    if let AgentAction::Final { text } = &mut action {
        if is_trailing_mention(trailing) {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trailing);
        }
    }

    Ok(action)
}

fn strip_code_fence(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn is_trailing_mention(trailing: &str) -> bool {
    !trailing.is_empty()
        && !trailing.starts_with('{')
        && !trailing.starts_with(',')
        && MENTION_REGEX.is_match(trailing)
}
