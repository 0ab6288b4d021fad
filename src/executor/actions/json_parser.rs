use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    ExecutionContext, NodeError, Secrets,
    executor::{Executor, NodeResult, actions::parse_config},
};

fn default_pointer() -> String {
    "/input".to_string()
}

#[derive(Deserialize, Debug, Clone)]
struct JsonParserConfig {
    /// JSON pointer into the input envelope
    #[serde(default = "default_pointer")]
    pointer: String,
}

/// Parses a JSON document received as text. Structured values pass through.
pub struct JsonParserAction;

#[async_trait]
impl Executor for JsonParserAction {
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": ["object", "null"],
            "properties": {
                "pointer": {
                    "type": "string",
                    "pattern": "^(/.*)?$",
                    "description": "JSON pointer to the text to parse, defaults to /input"
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
        let config: JsonParserConfig = parse_config(config)?;
        match input.pointer(&config.pointer) {
            Some(Value::String(text)) => serde_json::from_str(text).map_err(|e| NodeError::execution(format!("invalid JSON at '{}': {}", config.pointer, e))),
            Some(value) => Ok(value.clone()),
            None => Err(NodeError::execution(format!("nothing to parse at '{}'", config.pointer))),
        }
    }
}
