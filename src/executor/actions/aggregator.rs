use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    ExecutionContext, NodeError, Secrets,
    executor::{Executor, NodeResult, actions::parse_config},
};

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum AggregateMode {
    /// the whole input envelope, one field per port
    #[default]
    Merge,
    /// arrays from every port joined in port order; scalars are appended as items
    Concat,
}

#[derive(Deserialize, Debug, Clone, Default)]
struct AggregatorConfig {
    #[serde(default)]
    mode: AggregateMode,
}

/// Joins the values of several input ports.
pub struct DataAggregatorAction;

#[async_trait]
impl Executor for DataAggregatorAction {
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": ["object", "null"],
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["merge", "concat"]
                }
            }
        })
    }

    async fn execute(
        &self,
        input: Value,
        config: &Value,
        _secrets: &Secrets,
        _ctx: &ExecutionContext,
    ) -> NodeResult {
        let config: AggregatorConfig = parse_config(config)?;
        let Value::Object(ports) = input else {
            return Err(NodeError::execution("Data Aggregator expects an input envelope"));
        };

        match config.mode {
            AggregateMode::Merge => Ok(Value::Object(ports)),
            AggregateMode::Concat => {
                let mut joined = Vec::new();
                for (_, value) in ports {
                    match value {
                        Value::Array(items) => joined.extend(items),
                        Value::Null => {}
                        other => joined.push(other),
                    }
                }
                Ok(Value::Array(joined))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn aggregate(
        input: Value,
        config: Value,
    ) -> NodeResult {
        DataAggregatorAction.execute(input, &config, &Secrets::default(), &ExecutionContext::new("r1", "merge")).await
    }

    #[tokio::test]
    async fn test_merge_returns_envelope() {
        let out = aggregate(json!({"a": [1], "b": {"x": 2}}), Value::Null).await.unwrap();
        assert_eq!(out, json!({"a": [1], "b": {"x": 2}}));
    }

    #[tokio::test]
    async fn test_concat_keeps_port_order() {
        let out = aggregate(json!({"b": [3, 4], "a": [1], "c": 5}), json!({"mode": "concat"})).await.unwrap();
        assert_eq!(out, json!([3, 4, 1, 5]));
    }
}
