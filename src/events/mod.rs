//! Event types for run execution.
//!
//! Every state change of a run is recorded as an [`Event`] in the run's
//! append-only log and published on the engine channel. Events of one run are
//! numbered by `seq` in the order they were appended.

mod node;
mod run;

use serde::{Deserialize, Serialize};

pub use node::{NodeEvent, SkipReason};
pub use run::RunEvent;

use crate::{runtime::RunId, utils, workflow::NodeId};

/// A single entry in a run's execution log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// position in the run's log, starting at 0
    pub seq: u64,
    /// run that generated this event
    pub run_id: RunId,
    /// node that generated this event, `None` for run-level events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nid: Option<NodeId>,
    /// milliseconds since the unix epoch
    pub timestamp: i64,
    pub event: GraphEvent,
}

/// Top-level event type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum GraphEvent {
    /// Run-level events (started, ended).
    Run(RunEvent),
    /// Node-level events (ready, started, retrying, ...).
    Node(NodeEvent),
}

impl Event {
    pub(crate) fn run(
        run_id: &str,
        event: RunEvent,
    ) -> Self {
        Self {
            seq: 0,
            run_id: run_id.to_string(),
            nid: None,
            timestamp: utils::time::time_millis(),
            event: GraphEvent::Run(event),
        }
    }

    pub(crate) fn node(
        run_id: &str,
        nid: &str,
        event: NodeEvent,
    ) -> Self {
        Self {
            seq: 0,
            run_id: run_id.to_string(),
            nid: Some(nid.to_string()),
            timestamp: utils::time::time_millis(),
            event: GraphEvent::Node(event),
        }
    }

    /// Display name such as `RunStarted` or `NodeRetrying`.
    pub fn name(&self) -> String {
        match &self.event {
            GraphEvent::Run(e) => format!("Run{}", e.as_ref()),
            GraphEvent::Node(e) => format!("Node{}", e.as_ref()),
        }
    }

    /// The final event of a run.
    pub fn is_complete(&self) -> bool {
        matches!(self.event, GraphEvent::Run(RunEvent::Ended { .. }))
    }

    /// A node failure, or a run that ended failed.
    pub fn is_error(&self) -> bool {
        match &self.event {
            GraphEvent::Node(NodeEvent::Failed { .. }) => true,
            GraphEvent::Run(RunEvent::Ended { status }) => *status == crate::RunStatus::Failed,
            _ => false,
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self.event, GraphEvent::Node(NodeEvent::Log { .. }))
    }
}
