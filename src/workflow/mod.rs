pub mod edge;
pub mod node;
mod validate;
mod workflow;

pub use node::{NodeId, NodeSpec, RetryPolicy, RetrySettings};
pub use validate::{ValidationWarning, topological_order, validate};
pub use workflow::Workflow;
