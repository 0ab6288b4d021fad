use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{PipeflowError, Result, workflow::RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// maximum number of nodes running at the same time within one run, defaults to 4
    pub concurrency: usize,
    /// number of async worker threads when the engine owns its runtime, range [1, 32768), defaults to 16
    pub async_worker_thread_number: u16,
    /// cancel a run that has not finished after this many milliseconds
    pub run_timeout_ms: Option<u64>,
    /// per-attempt deadline for nodes that do not set their own `timeoutMs`
    pub node_timeout_ms: Option<u64>,
    /// how long in-flight nodes may keep running after a cancel before they are force-terminated
    pub cancel_grace_period_ms: u64,
    /// seed for backoff jitter; a fixed seed makes retry delays reproducible
    pub jitter_seed: Option<u64>,
    /// number of run records (event log + snapshot) kept in memory
    pub retained_runs: usize,
    /// retry defaults applied to nodes without their own overrides
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 4,
            async_worker_thread_number: 16,
            run_timeout_ms: None,
            node_timeout_ms: None,
            cancel_grace_period_ms: 5_000,
            jitter_seed: None,
            retained_runs: 2048,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| PipeflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        config.check()?;
        Ok(config)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(PipeflowError::Config("concurrency must be at least 1".to_string()));
        }
        if self.async_worker_thread_number == 0 {
            return Err(PipeflowError::Config("async_worker_thread_number must be at least 1".to_string()));
        }
        if self.retained_runs == 0 {
            return Err(PipeflowError::Config("retained_runs must be at least 1".to_string()));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(PipeflowError::Config(format!("retry.backoff_multiplier must be at least 1, got {}", self.retry.backoff_multiplier)));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(PipeflowError::Config(format!("retry.jitter must be within [0, 1], got {}", self.retry.jitter)));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }

    pub fn cancel_grace_period(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_period_ms)
    }
}
