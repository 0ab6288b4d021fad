//! Error types for Pipeflow.
//!
//! Engine-level failures are represented by `PipeflowError`. Graph problems
//! found before a run exists are `ValidationError`s, and everything that can go
//! wrong while a single node executes is a `NodeError`.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::NodeId;

/// Unified error type for all Pipeflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum PipeflowError {
    /// Engine-level errors (startup, shutdown, runtime construction).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// Runtime execution errors.
    #[error("{0}")]
    Runtime(String),

    /// Event log and snapshot store errors.
    #[error("{0}")]
    Store(String),

    /// Run lifecycle errors.
    #[error("{0}")]
    Run(String),

    /// Graph definition errors that are not validation findings.
    #[error("{0}")]
    Graph(String),

    /// Executor registration errors.
    #[error("{0}")]
    Executor(String),

    /// Secret store errors.
    #[error("{0}")]
    Secret(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),

    /// The submitted graph failed validation; no run was created.
    #[error("graph validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    /// A run, executor or other addressed resource does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        kind: String,
        id: String,
    },
}

impl PipeflowError {
    pub(crate) fn not_found(
        kind: &str,
        id: &str,
    ) -> Self {
        PipeflowError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    /// Returns the validation findings when this error came from graph validation.
    pub fn validation_errors(&self) -> Option<&[ValidationError]> {
        match self {
            PipeflowError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Which side of a connection a port reference belongs to.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A graph-level problem found by `validate`.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("node id must not be empty (node #{position})")]
    EmptyNodeId {
        position: usize,
    },

    #[error("node '{node_id}' is defined more than once")]
    DuplicateNode {
        node_id: NodeId,
    },

    #[error("node '{node_id}' declares {direction} port '{port}' more than once")]
    DuplicatePort {
        node_id: NodeId,
        port: String,
        direction: PortDirection,
    },

    #[error("connection '{connection_id}' references missing node '{node_id}'")]
    DanglingNode {
        connection_id: String,
        node_id: NodeId,
    },

    #[error("connection '{connection_id}' references missing {direction} port '{port}' on node '{node_id}'")]
    DanglingPort {
        connection_id: String,
        node_id: NodeId,
        port: String,
        direction: PortDirection,
    },

    #[error("input port '{port}' on node '{node_id}' has {} incoming connections ({}); use an aggregator node for fan-in", .connections.len(), .connections.join(", "))]
    PortArity {
        node_id: NodeId,
        port: String,
        connections: Vec<String>,
    },

    #[error("cycle detected: {}", .path.join(" -> "))]
    Cycle {
        path: Vec<NodeId>,
    },
}

/// Everything that can end a node attempt unsuccessfully.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeError {
    /// A secret reference could not be resolved at dispatch time.
    #[error("missing secret for '{key}'")]
    MissingSecret {
        key: String,
    },

    /// Business-logic failure raised by an executor.
    #[error("execution failed: {message}")]
    Execution {
        message: String,
    },

    /// The attempt exceeded its deadline.
    #[error("timed out after {after_ms}ms")]
    Timeout {
        after_ms: u64,
    },

    /// The run was cancelled while the node was in flight.
    #[error("cancelled")]
    Cancelled,

    /// Unknown node type or a config that does not match the executor's schema.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
    },
}

impl NodeError {
    pub fn execution(message: impl Into<String>) -> Self {
        NodeError::Execution {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        NodeError::Configuration {
            message: message.into(),
        }
    }

    /// Whether a retry policy may schedule another attempt after this error.
    pub fn is_retryable(
        &self,
        retry_missing_secrets: bool,
    ) -> bool {
        match self {
            NodeError::Execution { .. } | NodeError::Timeout { .. } => true,
            NodeError::MissingSecret { .. } => retry_missing_secrets,
            NodeError::Cancelled | NodeError::Configuration { .. } => false,
        }
    }
}

impl From<PipeflowError> for String {
    fn from(val: PipeflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for PipeflowError {
    fn from(error: std::io::Error) -> Self {
        PipeflowError::IoError(error.to_string())
    }
}

impl From<PipeflowError> for std::io::Error {
    fn from(val: PipeflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for PipeflowError {
    fn from(_: FromUtf8Error) -> Self {
        PipeflowError::Runtime("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for PipeflowError {
    fn from(error: serde_json::Error) -> Self {
        PipeflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for PipeflowError {
    fn from(error: toml::de::Error) -> Self {
        PipeflowError::Config(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for PipeflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        PipeflowError::Executor(error.to_string())
    }
}
