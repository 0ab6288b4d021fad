use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::debug;

use crate::{common::Shutdown, runtime::RunId, workflow::NodeId};

/// Receives log lines written by an executor.
pub type LogSink = Arc<dyn Fn(String) + Send + Sync>;

/// What an executor knows about the attempt it is running.
#[derive(Clone)]
pub struct ExecutionContext {
    run_id: RunId,
    node_id: NodeId,
    attempt: u32,
    deadline: Option<Instant>,
    cancel: Arc<Shutdown>,
    log: Option<LogSink>,
}

impl ExecutionContext {
    pub fn new(
        run_id: impl Into<RunId>,
        node_id: impl Into<NodeId>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            node_id: node_id.into(),
            attempt: 1,
            deadline: None,
            cancel: Arc::new(Shutdown::new()),
            log: None,
        }
    }

    pub fn with_attempt(
        mut self,
        attempt: u32,
    ) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_deadline(
        mut self,
        deadline: Option<Instant>,
    ) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_log_sink(
        mut self,
        sink: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        self.log = Some(Arc::new(sink));
        self
    }

    pub(crate) fn with_cancel(
        mut self,
        cancel: Arc<Shutdown>,
    ) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_terminated()
    }

    /// Resolves once the run has been cancelled.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        self.cancel.wait()
    }

    /// Write a line to the run's log as a `NodeLog` event.
    pub fn emit_log(
        &self,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match &self.log {
            Some(sink) => sink(message),
            None => debug!(run_id = %self.run_id, nid = %self.node_id, "{}", message),
        }
    }
}
