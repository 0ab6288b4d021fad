//! Node executors.
//!
//! An [`Executor`] implements the behaviour of one node type. Executors are
//! registered by type name in an [`ExecutorRegistry`]; the dispatcher looks
//! them up for every attempt and validates the node's config against the
//! executor's schema first.

pub mod actions;
mod registry;
pub(crate) mod template;

use async_trait::async_trait;
use serde_json::Value;

use crate::{NodeError, runtime::ExecutionContext, secret::Secrets};

pub use registry::ExecutorRegistry;

/// Result of one executor invocation.
pub type NodeResult = std::result::Result<Value, NodeError>;

#[async_trait]
pub trait Executor: Send + Sync {
    /// Returns the JSON schema the node config must satisfy.
    ///
    /// The default accepts any config.
    fn schema(&self) -> Value {
        serde_json::json!({})
    }

    /// Executes one attempt of a node.
    ///
    /// # Arguments
    ///
    /// * `input` - JSON object keyed by input port name.
    /// * `config` - The node config, already validated against [`Executor::schema`].
    /// * `secrets` - Secrets resolved for this attempt.
    /// * `ctx` - Run id, node id, attempt, cancellation, deadline and log sink.
    ///
    /// # Returns
    ///
    /// The node output. With several output ports it must be an object with
    /// one field per port.
    async fn execute(
        &self,
        input: Value,
        config: &Value,
        secrets: &Secrets,
        ctx: &ExecutionContext,
    ) -> NodeResult;
}
