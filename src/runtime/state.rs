use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    NodeError,
    events::SkipReason,
    runtime::RunId,
    utils,
    workflow::{NodeId, Workflow},
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Waiting,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Skipped | NodeStatus::Cancelled)
    }
}

/// Execution state of one node inside a run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeRunState {
    pub status: NodeStatus,
    /// attempts dispatched so far
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
}

/// Immutable point-in-time view of a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub id: RunId,
    pub workflow_id: String,
    pub status: RunStatus,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    pub nodes: BTreeMap<NodeId, NodeRunState>,
}

impl RunSnapshot {
    /// Initial snapshot of a run that has not been started: every node waiting.
    pub(crate) fn pending(
        run_id: &str,
        workflow: &Workflow,
    ) -> Self {
        Self {
            id: run_id.to_string(),
            workflow_id: workflow.id().to_string(),
            status: RunStatus::Pending,
            created_at: utils::time::time_millis(),
            started_at: None,
            ended_at: None,
            nodes: workflow.node_ids().into_iter().map(|nid| (nid, NodeRunState::default())).collect(),
        }
    }

    pub fn node(
        &self,
        nid: &str,
    ) -> Option<&NodeRunState> {
        self.nodes.get(nid)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Number of nodes currently in `status`.
    pub fn count(
        &self,
        status: NodeStatus,
    ) -> usize {
        self.nodes.values().filter(|n| n.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!NodeStatus::Ready.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert_eq!(NodeStatus::Succeeded.to_string(), "succeeded");
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut nodes = BTreeMap::new();
        nodes.insert("a".to_string(), NodeRunState {
            status: NodeStatus::Skipped,
            skip_reason: Some(SkipReason::Cancelled),
            ..Default::default()
        });
        let snapshot = RunSnapshot {
            id: "r1".into(),
            workflow_id: "wf".into(),
            status: RunStatus::Cancelled,
            created_at: 1,
            started_at: None,
            ended_at: Some(2),
            nodes,
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["status"], "cancelled");
        assert_eq!(value["nodes"]["a"]["skipReason"]["kind"], "cancelled");
        assert!(value.get("startedAt").is_none());
        assert_eq!(snapshot.count(NodeStatus::Skipped), 1);
        let back: RunSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
    }
}
