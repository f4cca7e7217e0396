//! Variable substitution engine for `{{variable}}` placeholders

use super::context::{json_kind, ContextError};

/// Substitute {{variable}} placeholders in a JSON value
pub fn substitute_variables(
    template: &serde_json::Value,
    variables: &serde_json::Value,
) -> Result<serde_json::Value, ContextError> {
    let vars = as_object(variables)?;
    Ok(substitute_value(template, vars))
}

/// Substitute {{variable}} placeholders in plain text
pub fn substitute_text(template: &str, variables: &serde_json::Value) -> Result<String, ContextError> {
    let vars = as_object(variables)?;
    Ok(substitute_string(template, vars))
}

fn as_object(
    variables: &serde_json::Value,
) -> Result<&serde_json::Map<String, serde_json::Value>, ContextError> {
    match variables {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ContextError::PayloadNotObject(json_kind(other))),
    }
}

fn substitute_value(
    value: &serde_json::Value,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(substitute_string(s, variables)),
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(|v| substitute_value(v, variables)).collect())
        }
        serde_json::Value::Object(obj) => {
            let mut rendered = serde_json::Map::new();
            for (key, val) in obj {
                rendered.insert(key.clone(), substitute_value(val, variables));
            }
            serde_json::Value::Object(rendered)
        }
        // Numbers, booleans, null are passed through as-is
        _ => value.clone(),
    }
}

fn substitute_string(
    template: &str,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    // Single left-to-right pass: replacement text is never scanned again
    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let close = match after_open.find("}}") {
            Some(close) => close,
            None => break,
        };

        result.push_str(&rest[..open]);
        let name = &after_open[..close];
        match variables.get(name) {
            Some(value) => result.push_str(&render_value(value)),
            // Unknown placeholders stay as written
            None => result.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }

    result.push_str(rest);
    result
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        // Arrays and objects keep their JSON representation
        _ => value.to_string(),
    }
}
