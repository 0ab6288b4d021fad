use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    ExecutionContext, Secrets,
    executor::{
        Executor, NodeResult,
        actions::{parse_config, primary_input},
    },
};

#[derive(Deserialize, Debug, Clone, Default)]
struct OutputConfig {
    #[serde(default)]
    label: Option<String>,
}

/// Terminal node. Logs what it received and returns it as the node output.
pub struct OutputHandlerAction;

#[async_trait]
impl Executor for OutputHandlerAction {
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": ["object", "null"],
            "properties": {
                "label": { "type": "string" }
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
        let config: OutputConfig = parse_config(config)?;
        let data = primary_input(&input);
        let summary = match &data {
            Value::Array(items) => format!("{} item(s)", items.len()),
            Value::Object(fields) => format!("object with {} field(s)", fields.len()),
            Value::Null => "nothing".to_string(),
            _ => "1 value".to_string(),
        };
        ctx.emit_log(format!("{}: received {}", config.label.as_deref().unwrap_or(ctx.node_id()), summary));
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_logs_summary_and_returns_input() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let ctx = ExecutionContext::new("r1", "store").with_log_sink(move |l| sink.lock().unwrap().push(l));

        let out = OutputHandlerAction.execute(json!({"input": [1, 2, 3]}), &json!({"label": "products"}), &Secrets::default(), &ctx).await.unwrap();
        assert_eq!(out, json!([1, 2, 3]));
        assert_eq!(*lines.lock().unwrap(), vec!["products: received 3 item(s)".to_string()]);
    }
}
