//! Execution of a single node, including retries and timeouts.

use std::{sync::Arc, time::Duration};

use petgraph::graph::NodeIndex;
use serde_json::Value;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, warn};

use crate::{
    ExecutionContext, NodeError,
    common::Shutdown,
    dispatcher::retry::Backoff,
    executor::{ExecutorRegistry, NodeResult},
    runtime::RunId,
    secret::SecretResolver,
    workflow::{NodeSpec, RetryPolicy},
};

/// What a worker tells the dispatcher.
pub(crate) enum Report {
    /// the attempt before `attempt` failed; `attempt` starts after `delay_ms`
    Retrying {
        idx: NodeIndex,
        attempt: u32,
        error: NodeError,
        delay_ms: u64,
    },
    Log {
        idx: NodeIndex,
        message: String,
    },
    Finished {
        idx: NodeIndex,
        result: NodeResult,
    },
}

/// One node of a run, from first attempt to final result.
pub(crate) struct NodeTask {
    pub run_id: RunId,
    pub idx: NodeIndex,
    pub spec: NodeSpec,
    pub input: Value,
    pub policy: RetryPolicy,
    pub timeout: Option<Duration>,
    pub backoff: Backoff,
    pub registry: Arc<ExecutorRegistry>,
    pub resolver: SecretResolver,
    pub cancel: Arc<Shutdown>,
    pub tx: mpsc::UnboundedSender<Report>,
}

impl NodeTask {
    pub(crate) async fn run(mut self) {
        let mut attempt = 1;
        let result = loop {
            let err = match self.attempt(attempt).await {
                Ok(output) => break Ok(output),
                Err(err) => err,
            };
            if self.cancel.is_terminated() {
                break Err(NodeError::Cancelled);
            }
            if attempt > self.policy.max_retries || !err.is_retryable(self.policy.retry_missing_secrets) {
                break Err(err);
            }

            let delay = self.backoff.delay(attempt);
            warn!(run_id = %self.run_id, nid = %self.spec.id, "attempt {} failed: {}, retrying in {:?}", attempt, err, delay);
            let _ = self.tx.send(Report::Retrying {
                idx: self.idx,
                attempt: attempt + 1,
                error: err,
                delay_ms: delay.as_millis() as u64,
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.wait() => break Err(NodeError::Cancelled),
            }
            attempt += 1;
        };

        let _ = self.tx.send(Report::Finished {
            idx: self.idx,
            result,
        });
    }

    /// Secrets are resolved and the config checked on every attempt, so no
    /// value outlives the attempt that needed it.
    async fn attempt(
        &self,
        attempt: u32,
    ) -> NodeResult {
        debug!("worker::attempt({}, {}, {})", self.run_id, self.spec.id, attempt);
        let secrets = self.resolver.resolve(&self.spec.secret_refs).await?;
        let executor = self.registry.prepare(&self.spec.node_type, &self.spec.config)?;

        let tx = self.tx.clone();
        let idx = self.idx;
        let ctx = ExecutionContext::new(self.run_id.clone(), self.spec.id.clone())
            .with_attempt(attempt)
            .with_deadline(self.timeout.map(|t| Instant::now() + t))
            .with_cancel(self.cancel.clone())
            .with_log_sink(move |message| {
                let _ = tx.send(Report::Log {
                    idx,
                    message,
                });
            });

        let execution = executor.execute(self.input.clone(), &self.spec.config, &secrets, &ctx);
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, execution).await.unwrap_or_else(|_| {
                Err(NodeError::Timeout {
                    after_ms: timeout.as_millis() as u64,
                })
            }),
            None => execution.await,
        }
    }
}
