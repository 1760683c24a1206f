//! Model output parsing
//!
//! Turns raw provider content into one result item. With an output schema
//! the content is expected to be a JSON object, possibly inside a fenced
//! block; anything that does not parse to an object is kept verbatim and
//! flagged `raw`.

use serde_json::{Map, Value};
use tracing::debug;

/// Locate the JSON payload inside model output.
///
/// Looks for a ```json fence first (either case), then for the outermost
/// `{ ... }` span.
pub fn extract_json(text: &str) -> Option<&str> {
    for fence in ["```json", "```JSON"] {
        if let Some(start) = text.find(fence) {
            let content = &text[start + fence.len()..];
            if let Some(end) = content.find("```") {
                return Some(content[..end].trim());
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| text[start..=end].trim())
}

/// `{content}` for text output.
pub fn text_item(content: &str) -> Map<String, Value> {
    let mut item = Map::new();
    item.insert("content".to_string(), Value::String(content.to_string()));
    item
}

/// Parse schema-shaped output, falling back to `{content, raw: true}`.
pub fn json_item(content: &str) -> Map<String, Value> {
    let candidate = extract_json(content).unwrap_or(content);
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            debug!("Model output is not a JSON object, keeping raw text");
            let mut item = text_item(content);
            item.insert("raw".to_string(), Value::Bool(true));
            item
        }
    }
}

/// Build the result item for one generation.
pub fn parse_output(content: &str, expects_json: bool) -> Map<String, Value> {
    if expects_json {
        json_item(content)
    } else {
        text_item(content)
    }
}
