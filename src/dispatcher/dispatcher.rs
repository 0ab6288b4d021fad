//! Run dispatcher for scheduling and executing nodes.
//!
//! The dispatcher is responsible for:
//! - Waiting for the run to be started or cancelled
//! - Releasing nodes once all their dependencies succeeded
//! - Keeping at most `concurrency` nodes in flight
//! - Blocking the dependents of failed nodes
//! - Cancellation, the run timeout and the grace period for in-flight nodes

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use petgraph::graph::NodeIndex;
use serde_json::{Map, Value};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    NodeError,
    common::{Queue, Shutdown},
    dispatcher::{
        Services,
        retry::{Backoff, node_seed},
        worker::{NodeTask, Report},
    },
    events::{Event, NodeEvent, RunEvent, SkipReason},
    executor::NodeResult,
    runtime::{NodeRunState, NodeStatus, RunCommand, RunId, RunSnapshot, RunStatus},
    store::RunRecord,
    utils,
    workflow::{NodeSpec, Workflow},
};

/// Run execution dispatcher.
///
/// Owns every [`NodeRunState`] of its run. Nothing else mutates them; other
/// components only see the snapshots it publishes.
pub(crate) struct Dispatcher {
    run_id: RunId,
    workflow: Arc<Workflow>,
    record: Arc<RunRecord>,
    services: Arc<Services>,

    nodes: Vec<NodeRunState>,
    /// dependencies per node that have not succeeded yet
    pending_deps: Vec<usize>,
    ready: BTreeSet<NodeIndex>,
    in_flight: BTreeMap<NodeIndex, JoinHandle<()>>,
    /// nodes not yet in a terminal state
    remaining: usize,

    status: RunStatus,
    created_at: i64,
    started_at: Option<i64>,
    ended_at: Option<i64>,

    cancelling: bool,
    cancel: Arc<Shutdown>,
    seed: u64,
    tx: mpsc::UnboundedSender<Report>,
    rx: Option<mpsc::UnboundedReceiver<Report>>,
}

impl Dispatcher {
    pub(crate) fn new(
        run_id: RunId,
        workflow: Arc<Workflow>,
        record: Arc<RunRecord>,
        services: Arc<Services>,
    ) -> Self {
        let count = workflow.node_count();
        let pending_deps = (0..count).map(|i| workflow.dependencies(NodeIndex::new(i)).len()).collect();
        let seed = services.config.jitter_seed.unwrap_or_else(rand::random);
        let created_at = record.snapshot().created_at;
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            run_id,
            workflow,
            record,
            services,
            nodes: vec![NodeRunState::default(); count],
            pending_deps,
            ready: BTreeSet::new(),
            in_flight: BTreeMap::new(),
            remaining: count,
            status: RunStatus::Pending,
            created_at,
            started_at: None,
            ended_at: None,
            cancelling: false,
            cancel: Arc::new(Shutdown::new()),
            seed,
            tx,
            rx: Some(rx),
        }
    }

    /// Spawns the dispatcher's main loop.
    ///
    /// The loop processes:
    /// - Run commands (Start, Cancel)
    /// - Worker reports (retries, logs, results)
    /// - The run timeout and the cancellation grace period
    pub(crate) fn start(
        self,
        command_queue: Arc<Queue<RunCommand>>,
    ) {
        let handle = self.services.handle.clone();
        handle.spawn(self.run(command_queue));
    }

    async fn run(
        mut self,
        command_queue: Arc<Queue<RunCommand>>,
    ) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        match command_queue.next_async().await {
            Some(RunCommand::Start) => {}
            Some(RunCommand::Cancel) | None => {
                self.cancel_pending();
                return;
            }
        }

        self.begin();
        let run_deadline = self.services.config.run_timeout().map(|t| Instant::now() + t);
        let mut grace_deadline: Option<Instant> = None;
        self.dispatch_ready();
        self.publish();

        while self.remaining > 0 {
            tokio::select! {
                Some(report) = rx.recv() => self.handle_report(report),
                Some(cmd) = command_queue.next_async(), if !self.cancelling => {
                    if cmd == RunCommand::Cancel {
                        grace_deadline = self.begin_cancel("cancel requested");
                    }
                }
                _ = sleep_until(run_deadline), if !self.cancelling => {
                    grace_deadline = self.begin_cancel("run timeout");
                }
                _ = sleep_until(grace_deadline) => {
                    grace_deadline = None;
                    self.force_terminate();
                }
            }
            self.dispatch_ready();
            self.publish();
        }

        self.finish();
    }

    fn begin(&mut self) {
        info!("run {} started with {} node(s)", self.run_id, self.nodes.len());
        self.status = RunStatus::Running;
        self.started_at = Some(utils::time::time_millis());
        self.emit_run(RunEvent::Started {
            node_ids: self.workflow.node_ids(),
        });

        for i in 0..self.nodes.len() {
            if self.pending_deps[i] == 0 {
                self.make_ready(NodeIndex::new(i));
            }
        }
    }

    /// A run cancelled before it started: nothing ran, every node is skipped.
    fn cancel_pending(&mut self) {
        info!("run {} cancelled before start", self.run_id);
        self.cancelling = true;
        self.cancel.shutdown();
        for i in 0..self.nodes.len() {
            self.skip(NodeIndex::new(i), SkipReason::Cancelled);
        }
        self.finish();
    }

    /// Returns the grace deadline when nodes are still in flight.
    fn begin_cancel(
        &mut self,
        reason: &str,
    ) -> Option<Instant> {
        info!("run {} cancelling: {}", self.run_id, reason);
        self.cancelling = true;
        self.cancel.shutdown();

        for i in 0..self.nodes.len() {
            if matches!(self.nodes[i].status, NodeStatus::Waiting | NodeStatus::Ready) {
                self.skip(NodeIndex::new(i), SkipReason::Cancelled);
            }
        }

        if self.in_flight.is_empty() { None } else { Some(Instant::now() + self.services.config.cancel_grace_period()) }
    }

    /// Abort every worker still running after the grace period.
    fn force_terminate(&mut self) {
        let in_flight = std::mem::take(&mut self.in_flight);
        for (idx, handle) in in_flight {
            handle.abort();
            if self.nodes[idx.index()].status == NodeStatus::Running {
                warn!("run {}: force-terminating node {}", self.run_id, self.workflow.node_at(idx).id);
                self.mark_cancelled(idx);
            }
        }
    }

    fn finish(&mut self) {
        self.status = if self.cancelling {
            RunStatus::Cancelled
        } else if self.nodes.iter().any(|n| n.status == NodeStatus::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        self.ended_at = Some(utils::time::time_millis());

        // the terminal snapshot is visible before RunEnded is
        self.publish();
        self.emit_run(RunEvent::Ended {
            status: self.status,
        });
        info!("run {} ended: {}", self.run_id, self.status);
        if let Err(err) = self.services.store.retire(&self.run_id) {
            warn!("run {}: failed to retire record: {}", self.run_id, err);
        }
    }

    fn handle_report(
        &mut self,
        report: Report,
    ) {
        match report {
            Report::Retrying {
                idx,
                attempt,
                error,
                delay_ms,
            } => {
                if self.nodes[idx.index()].status != NodeStatus::Running {
                    return;
                }
                self.nodes[idx.index()].attempts = attempt;
                self.emit_node(idx, NodeEvent::Retrying {
                    attempt,
                    error,
                    delay_ms,
                });
            }
            Report::Log {
                idx,
                message,
            } => {
                if self.nodes[idx.index()].status == NodeStatus::Running {
                    self.emit_node(idx, NodeEvent::Log {
                        message,
                    });
                }
            }
            Report::Finished {
                idx,
                result,
            } => self.on_finished(idx, result),
        }
    }

    fn on_finished(
        &mut self,
        idx: NodeIndex,
        result: NodeResult,
    ) {
        // late report from a force-terminated worker
        if self.nodes[idx.index()].status != NodeStatus::Running {
            return;
        }
        self.in_flight.remove(&idx);

        match result {
            Ok(output) => self.succeed(idx, output),
            Err(NodeError::Cancelled) if self.cancelling => self.mark_cancelled(idx),
            Err(err) => self.fail(idx, err),
        }
    }

    fn succeed(
        &mut self,
        idx: NodeIndex,
        output: Value,
    ) {
        debug!("run {}: node {} succeeded", self.run_id, self.workflow.node_at(idx).id);
        let state = &mut self.nodes[idx.index()];
        state.status = NodeStatus::Succeeded;
        state.output = Some(output.clone());
        state.ended_at = Some(utils::time::time_millis());
        self.remaining -= 1;
        self.emit_node(idx, NodeEvent::Succeeded {
            output,
        });

        if self.cancelling {
            return;
        }
        for dependent in self.workflow.dependents(idx) {
            let i = dependent.index();
            self.pending_deps[i] = self.pending_deps[i].saturating_sub(1);
            if self.pending_deps[i] == 0 && self.nodes[i].status == NodeStatus::Waiting {
                self.make_ready(dependent);
            }
        }
    }

    fn fail(
        &mut self,
        idx: NodeIndex,
        error: NodeError,
    ) {
        let nid = self.workflow.node_at(idx).id.clone();
        warn!("run {}: node {} failed: {}", self.run_id, nid, error);
        let state = &mut self.nodes[idx.index()];
        state.status = NodeStatus::Failed;
        state.error = Some(error.clone());
        state.ended_at = Some(utils::time::time_millis());
        self.remaining -= 1;
        self.emit_node(idx, NodeEvent::Failed {
            error,
        });

        for descendant in self.workflow.descendants(idx) {
            if matches!(self.nodes[descendant.index()].status, NodeStatus::Waiting | NodeStatus::Ready) {
                self.skip(descendant, SkipReason::BlockedByFailedDependency {
                    dependency: nid.clone(),
                });
            }
        }
    }

    fn skip(
        &mut self,
        idx: NodeIndex,
        reason: SkipReason,
    ) {
        trace!("run {}: skip {} ({})", self.run_id, self.workflow.node_at(idx).id, reason);
        self.ready.remove(&idx);
        let state = &mut self.nodes[idx.index()];
        state.status = NodeStatus::Skipped;
        state.skip_reason = Some(reason.clone());
        state.ended_at = Some(utils::time::time_millis());
        self.remaining -= 1;
        self.emit_node(idx, NodeEvent::Skipped {
            reason,
        });
    }

    fn mark_cancelled(
        &mut self,
        idx: NodeIndex,
    ) {
        let state = &mut self.nodes[idx.index()];
        state.status = NodeStatus::Cancelled;
        state.error = Some(NodeError::Cancelled);
        state.ended_at = Some(utils::time::time_millis());
        self.remaining -= 1;
        self.emit_node(idx, NodeEvent::Cancelled);
    }

    fn make_ready(
        &mut self,
        idx: NodeIndex,
    ) {
        self.nodes[idx.index()].status = NodeStatus::Ready;
        self.ready.insert(idx);
        self.emit_node(idx, NodeEvent::Ready);
    }

    /// Start ready nodes, lowest authoring position first, while slots are free.
    fn dispatch_ready(&mut self) {
        if self.cancelling {
            return;
        }
        while self.in_flight.len() < self.services.config.concurrency {
            let Some(idx) = self.ready.pop_first() else {
                break;
            };
            self.dispatch(idx);
        }
    }

    fn dispatch(
        &mut self,
        idx: NodeIndex,
    ) {
        let spec = self.workflow.node_at(idx).clone();
        trace!("run {}: dispatch {}", self.run_id, spec.id);

        let state = &mut self.nodes[idx.index()];
        state.status = NodeStatus::Running;
        state.attempts = 1;
        state.started_at = Some(utils::time::time_millis());
        self.emit_node(idx, NodeEvent::Started {
            attempt: 1,
        });

        let config = &self.services.config;
        let policy = spec.retry_policy(&config.retry);
        let task = NodeTask {
            run_id: self.run_id.clone(),
            idx,
            input: self.input_for(idx),
            backoff: Backoff::new(policy.clone(), node_seed(self.seed, idx.index())),
            policy,
            timeout: spec.timeout.or(config.node_timeout()),
            spec,
            registry: self.services.registry.clone(),
            resolver: self.services.resolver.clone(),
            cancel: self.cancel.clone(),
            tx: self.tx.clone(),
        };
        let handle = self.services.handle.spawn(task.run());
        self.in_flight.insert(idx, handle);
    }

    /// Input envelope of a node: one field per connected input port.
    fn input_for(
        &self,
        idx: NodeIndex,
    ) -> Value {
        let mut envelope = Map::new();
        for (source, conn) in self.workflow.incoming(idx) {
            let value = self.nodes[source.index()].output.as_ref().map(|output| route(self.workflow.node_at(source), &conn.source.port, output)).unwrap_or(Value::Null);
            envelope.insert(conn.target.port.clone(), value);
        }
        Value::Object(envelope)
    }

    fn emit_run(
        &self,
        event: RunEvent,
    ) {
        self.emit(Event::run(&self.run_id, event));
    }

    fn emit_node(
        &self,
        idx: NodeIndex,
        event: NodeEvent,
    ) {
        self.emit(Event::node(&self.run_id, &self.workflow.node_at(idx).id, event));
    }

    fn emit(
        &self,
        event: Event,
    ) {
        match self.record.append(event) {
            Ok(event) => self.services.channel.publish(event),
            Err(err) => warn!("run {}: dropping event: {}", self.run_id, err),
        }
    }

    fn publish(&self) {
        let nodes = self.workflow.nodes().zip(self.nodes.iter()).map(|(spec, state)| (spec.id.clone(), state.clone())).collect();
        self.record.publish(RunSnapshot {
            id: self.run_id.clone(),
            workflow_id: self.workflow.id().to_string(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            nodes,
        });
    }
}

/// The value a connection carries from `source`'s output `port`.
///
/// A node with a single output port sends its whole output; with several
/// ports each one carries the output field of the same name.
fn route(
    source: &NodeSpec,
    port: &str,
    output: &Value,
) -> Value {
    if source.outputs.len() <= 1 {
        return output.clone();
    }
    output.get(port).cloned().unwrap_or(Value::Null)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_route_by_port() {
        let single = NodeSpec {
            outputs: vec!["output".into()],
            ..spec()
        };
        assert_eq!(route(&single, "output", &json!([1])), json!([1]));

        let split = NodeSpec {
            outputs: vec!["valid".into(), "invalid".into()],
            ..spec()
        };
        let output = json!({"valid": [1], "invalid": [2]});
        assert_eq!(route(&split, "invalid", &output), json!([2]));
        assert_eq!(route(&split, "valid", &json!({})), Value::Null);
    }

    fn spec() -> NodeSpec {
        NodeSpec {
            id: "n".into(),
            node_type: "Data Source".into(),
            title: None,
            config: Value::Null,
            secret_refs: Default::default(),
            inputs: vec![],
            outputs: vec![],
            retry: None,
            timeout: None,
        }
    }
}
