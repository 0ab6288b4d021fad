use serde::{Deserialize, Serialize};

use crate::{
    PipeflowError, Result,
    model::{ConnectionModel, NodeModel},
};

/// The workflow graph handed to the engine by the canvas editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphModel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeModel>,
    #[serde(default, alias = "edges")]
    pub connections: Vec<ConnectionModel>,
}

impl GraphModel {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<GraphModel>(s).map_err(|e| PipeflowError::Graph(format!("{}", e)))
    }
}
