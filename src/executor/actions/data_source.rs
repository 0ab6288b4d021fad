use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    ExecutionContext, Secrets,
    executor::{Executor, NodeResult, actions::parse_config},
};

#[derive(Deserialize, Debug, Clone)]
struct DataSourceConfig {
    data: Value,
}

/// Emits a static value from its config.
pub struct DataSourceAction;

#[async_trait]
impl Executor for DataSourceAction {
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["data"],
            "properties": {
                "data": {
                    "description": "Value emitted on the output port"
                }
            }
        })
    }

    async fn execute(
        &self,
        _input: Value,
        config: &Value,
        _secrets: &Secrets,
        _ctx: &ExecutionContext,
    ) -> NodeResult {
        let config: DataSourceConfig = parse_config(config)?;
        Ok(config.data)
    }
}
