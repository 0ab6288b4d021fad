use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    ExecutionContext, NodeError, Secrets,
    executor::{
        Executor, NodeResult,
        actions::{parse_config, primary_input, select},
    },
};

#[derive(Deserialize, Debug, Clone)]
struct ValidatorConfig {
    /// fields every item must carry, as JSON pointers or dotted paths
    required: Vec<String>,
}

/// Fails when an item lacks a required field; otherwise passes its input on.
pub struct DataValidatorAction;

#[async_trait]
impl Executor for DataValidatorAction {
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["required"],
            "properties": {
                "required": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            }
        })
    }

    async fn execute(
        &self,
        input: Value,
        config: &Value,
        _secrets: &Secrets,
        ctx: &ExecutionContext,
    ) -> NodeResult {
        let config: ValidatorConfig = parse_config(config)?;
        let data = primary_input(&input);
        let items: Vec<&Value> = match &data {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        for (i, item) in items.iter().enumerate() {
            if let Some(field) = config.required.iter().find(|f| select(item, f).is_none_or(Value::is_null)) {
                return Err(NodeError::execution(format!("item {} is missing required field '{}'", i, field)));
            }
        }
        ctx.emit_log(format!("{} item(s) valid", items.len()));
        Ok(data)
    }
}
