//! # Pipeflow
//!
//! Pipeflow is the execution engine behind a visual scraper-workflow builder.
//! It takes the graph a canvas editor produces (nodes, ports and connections),
//! validates it, and runs it as a dependency-driven DAG.
//!
//! ## Core Features
//!
//! - **Validated Graphs**: Dangling references, port arity and cycles are rejected before a run exists
//! - **Concurrent Scheduling**: Independent branches run in parallel up to a configurable limit
//! - **Retries & Timeouts**: Per-node retry policies with seeded exponential backoff and deadlines
//! - **Just-in-time Secrets**: Credentials are resolved per node right before execution and never cached
//! - **Replayable Event Log**: Every run keeps an append-only event stream that can be subscribed to live
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipeflow::{EngineBuilder, GraphModel};
//!
//! let engine = EngineBuilder::new().build()?;
//! engine.launch();
//!
//! let graph = GraphModel::from_json(json_str)?;
//! let run_id = engine.submit(&graph)?;
//! let snapshot = engine.wait(&run_id).await?;
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
mod events;
mod executor;
mod model;
mod runtime;
mod secret;
mod store;
mod utils;
mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use config::Config;
pub use engine::Engine;
pub use error::{NodeError, PipeflowError, PortDirection, ValidationError};
pub use events::{Event, GraphEvent, NodeEvent, RunEvent, SkipReason};
pub use executor::{Executor, ExecutorRegistry, actions};
pub use model::*;
pub use runtime::{Channel, ChannelEvent, ChannelOptions, ExecutionContext, NodeRunState, NodeStatus, Run, RunCommand, RunId, RunSnapshot, RunStatus};
pub use secret::{EnvSecretStore, MemSecretStore, SecretResolver, SecretStore, Secrets};
pub use store::EventStream;
pub use workflow::{NodeId, RetryPolicy, RetrySettings, ValidationWarning, Workflow, topological_order, validate};

/// Result type alias for Pipeflow operations.
pub type Result<T> = std::result::Result<T, PipeflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
