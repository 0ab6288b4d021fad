use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    ExecutionContext, NodeError, Secrets,
    executor::{
        Executor, NodeResult,
        actions::{map_items, parse_config, primary_input, select},
    },
};

#[derive(Deserialize, Debug, Clone)]
struct TransformerConfig {
    /// output field name -> JSON pointer or dotted path into the item
    fields: Map<String, Value>,
}

/// Projects each item (or a single object) onto a new set of fields.
/// Fields missing from the item become `null`.
pub struct DataTransformerAction;

impl DataTransformerAction {
    fn project(
        item: &Value,
        fields: &Map<String, Value>,
    ) -> Value {
        let projected: Map<String, Value> = fields
            .iter()
            .map(|(name, path)| {
                let value = path.as_str().and_then(|p| select(item, p)).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();
        Value::Object(projected)
    }
}

#[async_trait]
impl Executor for DataTransformerAction {
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["fields"],
            "properties": {
                "fields": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Output field name to JSON pointer or dotted path"
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
        let config: TransformerConfig = parse_config(config)?;
        map_items(primary_input(&input), |i, item| {
            if !item.is_object() {
                return Err(NodeError::execution(format!("item {} is not an object", i)));
            }
            Ok(Self::project(&item, &config.fields))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn transform(
        input: Value,
        config: Value,
    ) -> NodeResult {
        DataTransformerAction.execute(input, &config, &Secrets::default(), &ExecutionContext::new("r1", "map")).await
    }

    #[tokio::test]
    async fn test_projects_array_items_in_field_order() {
        let out = transform(
            json!({"input": [{"title": "lamp", "offer": {"price": 25}}, {"title": "pen"}]}),
            json!({"fields": {"name": "title", "price": "/offer/price"}}),
        )
        .await
        .unwrap();
        assert_eq!(out, json!([{"name": "lamp", "price": 25}, {"name": "pen", "price": null}]));
        let keys: Vec<&String> = out[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["name", "price"]);
    }

    #[tokio::test]
    async fn test_projects_single_object() {
        let out = transform(json!({"input": {"a": {"b": 1}}}), json!({"fields": {"x": "a.b"}})).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_rejects_scalar_items() {
        let err = transform(json!({"input": [1]}), json!({"fields": {}})).await.unwrap_err();
        assert_eq!(err, NodeError::execution("item 0 is not an object"));
    }
}
