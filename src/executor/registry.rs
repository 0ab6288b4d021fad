use std::{collections::HashMap, sync::Arc};

use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use crate::{
    NodeError, PipeflowError, Result,
    executor::{Executor, actions},
};

struct Registered {
    executor: Arc<dyn Executor>,
    validator: Validator,
}

/// Maps node types to executors.
///
/// Config schemas are compiled when an executor is registered, so an invalid
/// schema is rejected up front instead of failing every node of that type.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Registered>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in node type.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        for (node_type, executor) in actions::builtins() {
            registry.register(node_type, executor)?;
        }
        Ok(registry)
    }

    /// Register `executor` for `node_type`, replacing any previous one.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        executor: Arc<dyn Executor>,
    ) -> Result<()> {
        let node_type = node_type.into();
        let schema = executor.schema();
        let validator = jsonschema::validator_for(&schema).map_err(|e| PipeflowError::Executor(format!("invalid config schema for '{}': {}", node_type, e)))?;
        debug!("registry::register({})", node_type);
        self.executors.insert(node_type, Registered {
            executor,
            validator,
        });
        Ok(())
    }

    pub fn lookup(
        &self,
        node_type: &str,
    ) -> Result<Arc<dyn Executor>> {
        self.executors.get(node_type).map(|r| r.executor.clone()).ok_or_else(|| PipeflowError::not_found("executor", node_type))
    }

    pub fn contains(
        &self,
        node_type: &str,
    ) -> bool {
        self.executors.contains_key(node_type)
    }

    /// Registered node types, sorted.
    pub fn node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }

    /// Check `config` against the schema registered for `node_type`.
    pub fn validate_config(
        &self,
        node_type: &str,
        config: &Value,
    ) -> std::result::Result<(), NodeError> {
        let registered = self.executors.get(node_type).ok_or_else(|| NodeError::configuration(format!("unknown node type '{}'", node_type)))?;
        let errors: Vec<String> = registered.validator.iter_errors(config).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NodeError::configuration(format!("invalid config for '{}': {}", node_type, errors.join("; "))))
        }
    }

    /// Look up the executor for a node and validate its config, reporting
    /// both failures as node configuration errors.
    pub(crate) fn prepare(
        &self,
        node_type: &str,
        config: &Value,
    ) -> std::result::Result<Arc<dyn Executor>, NodeError> {
        self.validate_config(node_type, config)?;
        self.lookup(node_type).map_err(|e| NodeError::configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{ExecutionContext, Secrets, executor::NodeResult};

    struct Echo;

    #[async_trait]
    impl Executor for Echo {
        fn schema(&self) -> Value {
            json!({"type": "object", "required": ["greeting"], "properties": {"greeting": {"type": "string"}}})
        }

        async fn execute(
            &self,
            input: Value,
            _config: &Value,
            _secrets: &Secrets,
            _ctx: &ExecutionContext,
        ) -> NodeResult {
            Ok(input)
        }
    }

    struct BrokenSchema;

    #[async_trait]
    impl Executor for BrokenSchema {
        fn schema(&self) -> Value {
            json!({"type": 12})
        }

        async fn execute(
            &self,
            input: Value,
            _config: &Value,
            _secrets: &Secrets,
            _ctx: &ExecutionContext,
        ) -> NodeResult {
            Ok(input)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ExecutorRegistry::new();
        registry.register("Echo", Arc::new(Echo)).unwrap();
        assert!(registry.lookup("Echo").is_ok());
        assert!(registry.contains("Echo"));

        let err = registry.lookup("Nope").err().unwrap();
        assert_eq!(err, PipeflowError::not_found("executor", "Nope"));
    }

    #[test]
    fn test_invalid_schema_rejected_at_registration() {
        let mut registry = ExecutorRegistry::new();
        let err = registry.register("Broken", Arc::new(BrokenSchema)).unwrap_err();
        assert!(matches!(err, PipeflowError::Executor(_)));
        assert!(!registry.contains("Broken"));
    }

    #[test]
    fn test_validate_config() {
        let mut registry = ExecutorRegistry::new();
        registry.register("Echo", Arc::new(Echo)).unwrap();

        assert!(registry.validate_config("Echo", &json!({"greeting": "hi"})).is_ok());
        let err = registry.validate_config("Echo", &json!({"greeting": 1})).unwrap_err();
        assert!(matches!(err, NodeError::Configuration { .. }));

        let err = registry.prepare("Nope", &json!({})).err().unwrap();
        assert!(matches!(err, NodeError::Configuration { .. }));
    }

    #[test]
    fn test_builtins() {
        let registry = ExecutorRegistry::with_builtins().unwrap();
        assert_eq!(
            registry.node_types(),
            vec!["Data Aggregator", "Data Filter", "Data Source", "Data Transformer", "Data Validator", "HTTP Request", "JSON Parser", "Output Handler"]
        );
    }
}
