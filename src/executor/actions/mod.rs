//! Built-in executors for the node palette.

pub mod aggregator;
pub mod data_source;
pub mod filter;
pub mod http_request;
pub mod json_parser;
pub mod output;
pub mod transformer;
pub mod validator;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{NodeError, executor::Executor};

pub use aggregator::DataAggregatorAction;
pub use data_source::DataSourceAction;
pub use filter::DataFilterAction;
pub use http_request::HttpRequestAction;
pub use json_parser::JsonParserAction;
pub use output::OutputHandlerAction;
pub use transformer::DataTransformerAction;
pub use validator::DataValidatorAction;

/// Node type names of the built-in executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display, strum::EnumString)]
pub enum ActionType {
    #[strum(serialize = "Data Source")]
    DataSource,
    #[strum(serialize = "JSON Parser")]
    JsonParser,
    #[strum(serialize = "Data Filter")]
    DataFilter,
    #[strum(serialize = "Data Transformer")]
    DataTransformer,
    #[strum(serialize = "Data Validator")]
    DataValidator,
    #[strum(serialize = "Data Aggregator")]
    DataAggregator,
    #[strum(serialize = "Output Handler")]
    OutputHandler,
    #[strum(serialize = "HTTP Request")]
    HttpRequest,
}

pub(crate) fn builtins() -> Vec<(String, Arc<dyn Executor>)> {
    vec![
        (ActionType::DataSource.to_string(), Arc::new(DataSourceAction) as Arc<dyn Executor>),
        (ActionType::JsonParser.to_string(), Arc::new(JsonParserAction)),
        (ActionType::DataFilter.to_string(), Arc::new(DataFilterAction)),
        (ActionType::DataTransformer.to_string(), Arc::new(DataTransformerAction)),
        (ActionType::DataValidator.to_string(), Arc::new(DataValidatorAction)),
        (ActionType::DataAggregator.to_string(), Arc::new(DataAggregatorAction)),
        (ActionType::OutputHandler.to_string(), Arc::new(OutputHandlerAction)),
        (ActionType::HttpRequest.to_string(), Arc::new(HttpRequestAction::new())),
    ]
}

/// Deserialize a node config that already passed schema validation.
pub(crate) fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T, NodeError> {
    // a node without config is authored as null
    let config = if config.is_null() { Value::Object(Default::default()) } else { config.clone() };
    serde_json::from_value(config).map_err(|e| NodeError::configuration(e.to_string()))
}

/// The value a single-input node works on: the only connected port, or the
/// `input` port when several are connected.
pub(crate) fn primary_input(input: &Value) -> Value {
    match input {
        Value::Object(ports) if ports.len() == 1 => ports.values().next().cloned().unwrap_or(Value::Null),
        Value::Object(ports) => ports.get(crate::model::DEFAULT_INPUT_PORT).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Select a field by JSON pointer (`/a/0/b`) or dotted path (`a.0.b`).
pub(crate) fn select<'a>(
    value: &'a Value,
    path: &str,
) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    if path.starts_with('/') {
        return value.pointer(path);
    }
    let mut current = value;
    for key in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            other => other.get(key)?,
        };
    }
    Some(current)
}

/// Apply `f` to every item of an array, or to a single value.
pub(crate) fn map_items(
    value: Value,
    mut f: impl FnMut(usize, Value) -> Result<Value, NodeError>,
) -> Result<Value, NodeError> {
    match value {
        Value::Array(items) => Ok(Value::Array(items.into_iter().enumerate().map(|(i, v)| f(i, v)).collect::<Result<Vec<_>, _>>()?)),
        other => f(0, other),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_action_type_names() {
        assert_eq!(ActionType::HttpRequest.as_ref(), "HTTP Request");
        assert_eq!(ActionType::from_str("Data Filter").unwrap(), ActionType::DataFilter);
        assert!(ActionType::from_str("Database").is_err());
    }

    #[test]
    fn test_primary_input() {
        assert_eq!(primary_input(&json!({"data": [1]})), json!([1]));
        assert_eq!(primary_input(&json!({"a": 1, "input": 2})), json!(2));
        assert_eq!(primary_input(&json!({})), Value::Null);
    }

    #[test]
    fn test_select() {
        let value = json!({"a": {"b": [10, {"c": "x"}]}});
        assert_eq!(select(&value, "/a/b/1/c"), Some(&json!("x")));
        assert_eq!(select(&value, "a.b.0"), Some(&json!(10)));
        assert_eq!(select(&value, "a.missing"), None);
        assert_eq!(select(&value, ""), Some(&value));
    }

    #[test]
    fn test_parse_config_null_is_empty() {
        #[derive(serde::Deserialize)]
        struct Cfg {
            #[serde(default)]
            mode: Option<String>,
        }
        let cfg: Cfg = parse_config(&Value::Null).unwrap();
        assert!(cfg.mode.is_none());
    }
}
