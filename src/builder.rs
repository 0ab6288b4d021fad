use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{Config, Engine, Executor, ExecutorRegistry, MemSecretStore, PipeflowError, Result, SecretResolver, SecretStore};

/// Configures and builds an [`Engine`].
///
/// By default the engine gets every built-in executor and an empty in-memory
/// secret store. It runs on the tokio runtime it is built in; outside of one it
/// creates its own with `async_worker_thread_number` workers.
pub struct EngineBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    registry: Option<ExecutorRegistry>,
    executors: Vec<(String, Arc<dyn Executor>)>,
    secret_store: Option<Arc<dyn SecretStore>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            rt: None,
            registry: None,
            executors: Vec::new(),
            secret_store: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn concurrency(
        mut self,
        n: usize,
    ) -> Self {
        self.config.concurrency = n;
        self
    }

    /// Fix the seed of the backoff jitter.
    pub fn jitter_seed(
        mut self,
        seed: u64,
    ) -> Self {
        self.config.jitter_seed = Some(seed);
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    pub fn secret_store(
        mut self,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        self.secret_store = Some(store);
        self
    }

    /// Replace the built-in registry.
    pub fn registry(
        mut self,
        registry: ExecutorRegistry,
    ) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register an executor on top of the registry, replacing one of the same type.
    pub fn register(
        mut self,
        node_type: impl Into<String>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        self.executors.push((node_type.into(), executor));
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.check()?;

        let mut registry = match self.registry {
            Some(registry) => registry,
            None => ExecutorRegistry::with_builtins()?,
        };
        for (node_type, executor) in self.executors {
            registry.register(node_type, executor)?;
        }
        let store = self.secret_store.unwrap_or_else(|| Arc::new(MemSecretStore::new()));

        let (handle, runtime) = match (self.rt, Handle::try_current()) {
            (Some(rt), _) => (rt.handle().clone(), Some(rt)),
            (None, Ok(handle)) => (handle, None),
            (None, Err(_)) => {
                let rt = Builder::new_multi_thread()
                    .worker_threads(self.config.async_worker_thread_number.into())
                    .enable_all()
                    .build()
                    .map_err(|e| PipeflowError::Engine(format!("failed to build runtime: {}", e)))?;
                let rt = Arc::new(rt);
                (rt.handle().clone(), Some(rt))
            }
        };

        Ok(Engine::new(self.config, registry, SecretResolver::new(store), handle, runtime))
    }
}
