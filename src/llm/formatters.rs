//! Render the vendor-agnostic tool catalog into the three wire shapes
//! concrete providers need (§4.5). Each formatter is a pure function over
//! [`Tool`] — the concrete HTTP request building stays with the (external)
//! vendor backend.

use super::types::Tool;
use serde_json::{json, Value};

/// OpenAI-style `{"type": "function", "function": {...}}` wrapper.
pub fn to_openai(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}

/// Anthropic-style flat `{"name", "description", "input_schema"}`.
pub fn to_anthropic(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters,
            })
        })
        .collect()
}

/// Google-style `{"name", "description", "parameters"}`, restricted to the
/// JSON-schema subset Gemini's function-declaration format accepts: only
/// `type`, `properties`, `items`, `required`, `enum`, `description` survive;
/// everything else (`additionalProperties`, `$ref`, format keywords outside
/// the allow-list, ...) is dropped rather than rejected by the API.
pub fn to_google(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": restrict_schema(&tool.parameters),
            })
        })
        .collect()
}

const ALLOWED_SCHEMA_KEYS: &[&str] = &["type", "properties", "items", "required", "enum", "description"];

fn restrict_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut restricted = serde_json::Map::new();
            for (key, value) in map {
                if !ALLOWED_SCHEMA_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let value = match key.as_str() {
                    "properties" => Value::Object(
                        value
                            .as_object()
                            .map(|props| props.iter().map(|(k, v)| (k.clone(), restrict_schema(v))).collect())
                            .unwrap_or_default(),
                    ),
                    "items" => restrict_schema(value),
                    _ => value.clone(),
                };
                restricted.insert(key.clone(), value);
            }
            Value::Object(restricted)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool() -> Tool {
        Tool {
            name: "add".into(),
            description: "add two numbers".into(),
            parameters: json!({
                "type": "object",
                "properties": { "a": {"type": "number"}, "b": {"type": "number"} },
                "required": ["a", "b"],
                "additionalProperties": false,
            }),
        }
    }

    #[test]
    fn openai_wraps_in_function_envelope() {
        let rendered = to_openai(&[sample_tool()]);
        assert_eq!(rendered[0]["type"], "function");
        assert_eq!(rendered[0]["function"]["name"], "add");
    }

    #[test]
    fn anthropic_uses_input_schema_key() {
        let rendered = to_anthropic(&[sample_tool()]);
        assert_eq!(rendered[0]["input_schema"]["type"], "object");
        assert!(rendered[0].get("parameters").is_none());
    }

    #[test]
    fn google_strips_additional_properties() {
        let rendered = to_google(&[sample_tool()]);
        let params = &rendered[0]["parameters"];
        assert!(params.get("additionalProperties").is_none());
        assert_eq!(params["type"], "object");
        assert!(params["properties"]["a"].get("type").is_some());
    }
}
