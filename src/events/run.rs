use serde::{Deserialize, Serialize};

use crate::{RunStatus, workflow::NodeId};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, strum::AsRefStr)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        /// all node ids of the run in authoring order
        node_ids: Vec<NodeId>,
    },
    Ended {
        status: RunStatus,
    },
}
