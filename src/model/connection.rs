use serde::{Deserialize, Serialize};

use super::node::{DEFAULT_INPUT_PORT, DEFAULT_OUTPUT_PORT};

fn default_source_handle() -> String {
    DEFAULT_OUTPUT_PORT.to_string()
}

fn default_target_handle() -> String {
    DEFAULT_INPUT_PORT.to_string()
}

/// A directed connection between an output port and an input port, as authored on the canvas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionModel {
    #[serde(default)]
    pub id: String,
    pub source: String,
    #[serde(default = "default_source_handle")]
    pub source_handle: String,
    pub target: String,
    #[serde(default = "default_target_handle")]
    pub target_handle: String,
}

impl ConnectionModel {
    /// The connection id, or the canvas-style `source-sourceHandle-target-targetHandle` when none was given.
    pub fn effective_id(&self) -> String {
        if self.id.is_empty() {
            format!("{}-{}-{}-{}", self.source, self.source_handle, self.target, self.target_handle)
        } else {
            self.id.clone()
        }
    }
}
