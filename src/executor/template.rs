//! Placeholder substitution for executor configs.
//!
//! `{{#port.path#}}` reads from the node's input envelope: the first segment
//! names the input port, the rest is a dot-separated path where numeric
//! segments index arrays. `{{$name$}}` reads a resolved secret by logical
//! name. Any placeholder that cannot be resolved fails the whole template.

use regex::Regex;
use serde_json::Value;

use crate::{NodeError, secret::Secrets};

/// Format: `{{#port.key#}}` or `{{#port.key.subkey#}}`; a bare `{{#port#}}` is the whole port value
const INPUT_TEMPLATE_PATTERN: &str = r"\{\{#([^.#]+)((?:\.[^#]+)?)#\}\}";
/// Format: `{{$name$}}`
const SECRET_TEMPLATE_PATTERN: &str = r"\{\{\$([^$]+)\$\}\}";

fn compile(pattern: &str) -> Result<Regex, NodeError> {
    Regex::new(pattern).map_err(|e| NodeError::configuration(e.to_string()))
}

/// Look up `port.key.subkey` in the input envelope.
pub fn lookup<'a>(
    input: &'a Value,
    port: &str,
    path: &str,
) -> Option<&'a Value> {
    let mut current = input.get(port)?;
    for key in path.split('.').filter(|k| !k.is_empty()) {
        current = match current {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            other => other.get(key)?,
        };
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve every placeholder in `template`.
pub fn resolve_template(
    input: &Value,
    secrets: &Secrets,
    template: &str,
) -> Result<String, NodeError> {
    let mut result = template.to_string();
    let mut errors: Vec<String> = Vec::new();

    let secret_re = compile(SECRET_TEMPLATE_PATTERN)?;
    for caps in secret_re.captures_iter(template) {
        let name = &caps[1];
        match secrets.get(name) {
            Some(value) => result = result.replace(&caps[0], value),
            None => errors.push(format!("secret '{}' not found", name)),
        }
    }

    let input_re = compile(INPUT_TEMPLATE_PATTERN)?;
    for caps in input_re.captures_iter(template) {
        match lookup(input, &caps[1], &caps[2]) {
            Some(value) => result = result.replace(&caps[0], &stringify(value)),
            None => errors.push(format!("variable '{}' not found", &caps[0])),
        }
    }

    if !errors.is_empty() {
        return Err(NodeError::execution(errors.join(", ")));
    }

    Ok(result)
}

/// Resolve placeholders in every string of a JSON value.
///
/// A string that consists of a single input placeholder is replaced by the
/// referenced value itself, so `"{{#input.items#}}"` yields an array rather
/// than its JSON text.
pub fn resolve_json_value(
    input: &Value,
    secrets: &Secrets,
    value: &Value,
) -> Result<Value, NodeError> {
    match value {
        Value::String(s) => {
            let input_re = compile(INPUT_TEMPLATE_PATTERN)?;
            if let Some(caps) = input_re.captures(s).filter(|caps| caps[0].len() == s.len()) {
                return lookup(input, &caps[1], &caps[2]).cloned().ok_or_else(|| NodeError::execution(format!("variable '{}' not found", s)));
            }
            Ok(Value::String(resolve_template(input, secrets, s)?))
        }
        Value::Array(arr) => {
            let resolved: Result<Vec<Value>, NodeError> = arr.iter().map(|v| resolve_json_value(input, secrets, v)).collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(obj) => {
            let resolved: Result<serde_json::Map<String, Value>, NodeError> = obj.iter().map(|(k, v)| resolve_json_value(input, secrets, v).map(|rv| (k.clone(), rv))).collect();
            Ok(Value::Object(resolved?))
        }
        _ => Ok(value.clone()),
    }
}
