use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workflow::RetrySettings;

pub(crate) const DEFAULT_INPUT_PORT: &str = "input";
pub(crate) const DEFAULT_OUTPUT_PORT: &str = "output";

fn default_inputs() -> Vec<String> {
    vec![DEFAULT_INPUT_PORT.to_string()]
}

fn default_outputs() -> Vec<String> {
    vec![DEFAULT_OUTPUT_PORT.to_string()]
}

/// A node as authored on the canvas.
///
/// Unknown fields (canvas position, icons, ...) are ignored. The canvas keeps
/// node settings under `data`, which is accepted as an alias of `config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeModel {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, alias = "data")]
    pub config: serde_json::Value,
    #[serde(default)]
    pub secret_refs: BTreeMap<String, String>,
    #[serde(default = "default_inputs")]
    pub inputs: Vec<String>,
    #[serde(default = "default_outputs")]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySettings>,
    /// per-attempt timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}
