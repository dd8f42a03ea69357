//! Pulling a JSON object out of a model reply.

use serde_json::{Map, Value};

/// Key a bare top-level array is wrapped under.
pub const ARRAY_KEY: &str = "exercises";

/// Parse a reply into a JSON object.
///
/// Accepts fenced code blocks and leading or trailing prose around the
/// JSON. A top-level array becomes `{"exercises": [...]}`.
pub fn parse_object(reply: &str) -> Result<Map<String, Value>, String> {
    let text = strip_fences(reply.trim());
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(first) => embedded_json(text).ok_or_else(|| format!("invalid JSON: {first}"))?,
    };
    match value {
        Value::Object(map) => Ok(map),
        Value::Array(items) => {
            let mut map = Map::new();
            map.insert(ARRAY_KEY.to_string(), Value::Array(items));
            Ok(map)
        }
        other => Err(format!("expected a JSON object, got {}", kind(&other))),
    }
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string ("json") up to the first newline
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// The outermost `{...}` or `[...]` span that parses.
fn embedded_json(text: &str) -> Option<Value> {
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close))
            && start < end
            && let Ok(value) = serde_json::from_str(&text[start..=end])
        {
            return Some(value);
        }
    }
    None
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
