//! Validated connections between node ports.

use serde::{Deserialize, Serialize};

use crate::workflow::node::NodeId;

/// One end of a connection: a node and one of its ports.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node: NodeId,
    pub port: String,
}

/// A validated, directed connection from an output port to an input port.
///
/// The target depends on the source: it cannot become ready before the
/// source has succeeded, and it receives the source's output on `target.port`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: String,
    pub source: PortRef,
    pub target: PortRef,
}
