//! Shared helpers for the engine integration tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt;
use pipeflow::{Engine, Event, ExecutionContext, Executor, GraphEvent, GraphModel, NodeError, NodeEvent, Secrets};
use serde_json::{Value, json};

/// Test executor that counts invocations and can be told to fail or stall.
#[derive(Default)]
pub struct Scripted {
    /// number of leading invocations that fail with an execution error
    pub fail_first: usize,
    pub delay: Duration,
    /// keep sleeping through a cancellation
    pub ignore_cancel: bool,

    pub calls: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub started: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl Scripted {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_first: usize::MAX,
            ..Default::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn stubborn(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ignore_cancel: true,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    async fn wait(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<(), NodeError> {
        if self.delay.is_zero() {
            return Ok(());
        }
        if self.ignore_cancel {
            tokio::time::sleep(self.delay).await;
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => Ok(()),
            _ = ctx.cancelled() => Err(NodeError::Cancelled),
        }
    }
}

#[async_trait]
impl Executor for Scripted {
    async fn execute(
        &self,
        input: Value,
        _config: &Value,
        _secrets: &Secrets,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.started.lock().unwrap().push(ctx.node_id().to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let waited = self.wait(ctx).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        waited?;

        if call <= self.fail_first {
            return Err(NodeError::execution(format!("{} failed on call {}", ctx.node_id(), call)));
        }
        Ok(json!({"node": ctx.node_id(), "input": input}))
    }
}

#[allow(dead_code)]
pub fn graph(
    nodes: Value,
    connections: Value,
) -> GraphModel {
    serde_json::from_value(json!({
        "id": "test-graph",
        "nodes": nodes,
        "connections": connections,
    }))
    .unwrap()
}

/// A source node of `node_type` without input ports.
#[allow(dead_code)]
pub fn source(
    id: &str,
    node_type: &str,
) -> Value {
    json!({"id": id, "type": node_type, "inputs": []})
}

#[allow(dead_code)]
pub fn edge(
    source: &str,
    target: &str,
) -> Value {
    json!({"source": source, "target": target})
}

#[allow(dead_code)]
pub async fn events(
    engine: &Engine,
    run_id: &str,
) -> Vec<Event> {
    let stream = engine.subscribe(run_id).unwrap();
    tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>()).await.unwrap()
}

/// The node events of `nid` in log order.
#[allow(dead_code)]
pub fn node_events<'a>(
    events: &'a [Event],
    nid: &str,
) -> Vec<&'a NodeEvent> {
    events
        .iter()
        .filter(|e| e.nid.as_deref() == Some(nid))
        .filter_map(|e| match &e.event {
            GraphEvent::Node(n) => Some(n),
            GraphEvent::Run(_) => None,
        })
        .collect()
}

/// Position of the first event of `nid` named `name` (e.g. `NodeSucceeded`).
#[allow(dead_code)]
pub fn position(
    events: &[Event],
    nid: &str,
    name: &str,
) -> usize {
    events.iter().position(|e| e.nid.as_deref() == Some(nid) && e.name() == name).unwrap()
}
