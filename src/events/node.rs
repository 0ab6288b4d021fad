use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{NodeError, workflow::NodeId};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, strum::AsRefStr)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    /// all dependencies succeeded; waiting for a concurrency slot
    Ready,
    /// first attempt dispatched
    Started {
        attempt: u32,
    },
    /// attempt `attempt - 1` failed; attempt `attempt` runs after `delay_ms`
    Retrying {
        attempt: u32,
        error: NodeError,
        delay_ms: u64,
    },
    Succeeded {
        output: Value,
    },
    Failed {
        error: NodeError,
    },
    Skipped {
        reason: SkipReason,
    },
    /// stopped in flight because the run was cancelled
    Cancelled,
    /// line written by the executor through its context
    Log {
        message: String,
    },
}

/// Why a node never ran.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    BlockedByFailedDependency {
        dependency: NodeId,
    },
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            SkipReason::BlockedByFailedDependency { dependency } => write!(f, "blocked by failed dependency '{}'", dependency),
            SkipReason::Cancelled => write!(f, "run cancelled"),
        }
    }
}
