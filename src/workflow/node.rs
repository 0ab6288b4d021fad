use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::model::NodeModel;

/// node id
pub type NodeId = String;

/// Retry behaviour for a node whose attempt failed with a retryable error.
///
/// The delay before retry `n` (1-based) is
/// `min(initial_backoff_ms * backoff_multiplier^(n-1), max_backoff_ms)` plus a
/// random jitter of up to `jitter` times that delay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// retries after the first attempt
    pub max_retries: u32,
    /// delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// upper bound for the delay before jitter is added
    pub max_backoff_ms: u64,
    /// jitter ratio in [0, 1]
    pub jitter: f64,
    /// a missing secret is normally final; set to retry it like an execution error
    pub retry_missing_secrets: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
            jitter: 0.1,
            retry_missing_secrets: false,
        }
    }
}

/// Per-node retry overrides as authored in the graph. Unset fields fall back to the engine defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_missing_secrets: Option<bool>,
}

impl RetrySettings {
    pub fn apply(
        &self,
        defaults: &RetryPolicy,
    ) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            initial_backoff_ms: self.initial_backoff_ms.unwrap_or(defaults.initial_backoff_ms),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(defaults.backoff_multiplier),
            max_backoff_ms: self.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
            jitter: self.jitter.unwrap_or(defaults.jitter).clamp(0.0, 1.0),
            retry_missing_secrets: self.retry_missing_secrets.unwrap_or(defaults.retry_missing_secrets),
        }
    }
}

/// Immutable definition of a node instance inside a validated workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeSpec {
    /// node id
    pub id: NodeId,
    /// executor key
    pub node_type: String,
    /// display name
    pub title: Option<String>,
    /// executor configuration
    pub config: serde_json::Value,
    /// logical credential name -> secret id
    pub secret_refs: BTreeMap<String, String>,
    /// ordered input ports
    pub inputs: Vec<String>,
    /// ordered output ports
    pub outputs: Vec<String>,
    /// retry overrides
    pub retry: Option<RetrySettings>,
    /// per-attempt timeout
    pub timeout: Option<Duration>,
}

impl NodeSpec {
    /// The effective retry policy given the engine defaults.
    pub fn retry_policy(
        &self,
        defaults: &RetryPolicy,
    ) -> RetryPolicy {
        match &self.retry {
            Some(settings) => settings.apply(defaults),
            None => defaults.clone(),
        }
    }

    /// A node without input ports starts a branch.
    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

impl From<&NodeModel> for NodeSpec {
    fn from(model: &NodeModel) -> Self {
        Self {
            id: model.id.clone(),
            node_type: model.node_type.clone(),
            title: model.title.clone(),
            config: model.config.clone(),
            secret_refs: model.secret_refs.clone(),
            inputs: model.inputs.clone(),
            outputs: model.outputs.clone(),
            retry: model.retry.clone(),
            timeout: model.timeout_ms.map(Duration::from_millis),
        }
    }
}
