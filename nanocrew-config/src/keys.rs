//! camelCase ⇄ snake_case key conversion, preserving session identifiers.
//!
//! Grounded on the donor's `convert_keys`/`convert_to_camel`/`camel_to_snake`
//! helpers: the on-disk document is camelCase, the in-memory schema is
//! snake_case, and any key containing a colon is a session identifier that
//! must pass through unchanged in both directions.

use serde_json::{Map, Value};

fn is_session_key(key: &str) -> bool {
    key.contains(':')
}

/// Converts every non-session-key in `value` from camelCase to snake_case,
/// recursively.
#[must_use]
pub fn convert_keys_to_snake(value: Value) -> Value {
    convert(value, camel_to_snake)
}

/// Converts every non-session-key in `value` from snake_case to camelCase,
/// recursively.
#[must_use]
pub fn convert_keys_to_camel(value: Value) -> Value {
    convert(value, snake_to_camel)
}

fn convert(value: Value, key_fn: fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let mut result = Map::with_capacity(map.len());
            for (key, v) in map {
                let converted_key = if is_session_key(&key) {
                    key
                } else {
                    key_fn(&key)
                };
                result.insert(converted_key, convert(v, key_fn));
            }
            Value::Object(result)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|item| convert(item, key_fn)).collect()),
        other => other,
    }
}

/// Converts one camelCase identifier to snake_case.
#[must_use]
pub fn camel_to_snake(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            result.push('_');
        }
        result.extend(ch.to_lowercase());
    }
    result
}

/// Converts one snake_case identifier to camelCase.
#[must_use]
pub fn snake_to_camel(name: &str) -> String {
    let mut parts = name.split('_');
    let mut result = parts.next().unwrap_or_default().to_owned();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            result.extend(first.to_uppercase());
            result.push_str(chars.as_str());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_to_snake_converts_identifiers() {
        assert_eq!(camel_to_snake("maxTokens"), "max_tokens");
        assert_eq!(camel_to_snake("maxToolIterations"), "max_tool_iterations");
        assert_eq!(camel_to_snake("workspace"), "workspace");
    }

    #[test]
    fn snake_to_camel_converts_identifiers() {
        assert_eq!(snake_to_camel("max_tokens"), "maxTokens");
        assert_eq!(snake_to_camel("max_tool_iterations"), "maxToolIterations");
        assert_eq!(snake_to_camel("workspace"), "workspace");
    }

    #[test]
    fn round_trip_is_a_fixed_point() {
        let original = "memoryWindow";
        assert_eq!(snake_to_camel(&camel_to_snake(original)), original);
    }

    #[test]
    fn session_keys_pass_through_unchanged_in_both_directions() {
        let value = json!({
            "bindings": {
                "telegram:12345": "backend",
                "feishu:oc_abc": "main"
            },
            "maxTokens": 8192
        });

        let snake = convert_keys_to_snake(value.clone());
        assert_eq!(snake["bindings"]["telegram:12345"], "backend");
        assert_eq!(snake["max_tokens"], 8192);

        let camel = convert_keys_to_camel(snake);
        assert_eq!(camel["bindings"]["feishu:oc_abc"], "main");
        assert_eq!(camel["maxTokens"], 8192);
    }

    #[test]
    fn nested_arrays_are_converted() {
        let value = json!({ "agentList": [{ "agentName": "main" }] });
        let snake = convert_keys_to_snake(value);
        assert_eq!(snake["agent_list"][0]["agent_name"], "main");
    }
}
