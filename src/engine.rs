//! Pipeflow engine - the main entry point.
//!
//! The engine owns everything runs share:
//! - The executor registry and the secret resolver
//! - The run store (event logs and snapshots)
//! - The event channel and the monitor
//! - The set of active runs and graceful shutdown

mod monitor;

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::runtime::{Handle, Runtime};
use tracing::{info, warn};

use crate::{
    ChannelEvent, ChannelOptions, Config, Event, ExecutorRegistry, PipeflowError, Result, SecretResolver, ShareLock,
    common::{Queue, Shutdown},
    dispatcher::Services,
    model::GraphModel,
    runtime::{Channel, Run, RunId, RunSnapshot},
    store::{EventStream, Store},
    workflow,
};

use monitor::Monitor;

/// Size of the queue for completed run notifications.
const RUN_COMPLETE_QUEUE_SIZE: usize = 100;

/// The workflow execution engine.
///
/// Engine is the central coordinator for Pipeflow, responsible for:
/// - Validating graphs and turning them into runs
/// - Starting, cancelling and observing runs
/// - Coordinating the event channel for pub/sub messaging
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().concurrency(2).build()?;
/// engine.launch();
///
/// let run_id = engine.submit(&graph)?;
/// let mut events = engine.subscribe(&run_id)?;
/// while let Some(event) = events.next().await {
///     println!("{}", event.name());
/// }
///
/// let snapshot = engine.status(&run_id)?;
/// engine.shutdown();
/// ```
pub struct Engine {
    services: Arc<Services>,
    /// Background monitor logging every event.
    monitor: Monitor,
    /// Queue for receiving run completion notifications.
    runs_complete_queue: Arc<Queue<RunId>>,
    /// Runs that have not ended yet. Never evicted: only `RunEnded` removes a run.
    runs: ShareLock<HashMap<RunId, Arc<Run>>>,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Owned runtime when the engine was not built inside one; kept alive for the engine's lifetime.
    _runtime: Option<Arc<Runtime>>,
    /// Shutdown coordinator for graceful termination.
    shutdown: Arc<Shutdown>,
}

impl Engine {
    pub(crate) fn new(
        config: Config,
        registry: ExecutorRegistry,
        resolver: SecretResolver,
        handle: Handle,
        runtime: Option<Arc<Runtime>>,
    ) -> Self {
        let store = Arc::new(Store::new(config.retained_runs));
        let channel = Arc::new(Channel::new(handle.clone()));
        let monitor = Monitor::new(channel.clone());

        let services = Arc::new(Services {
            config,
            registry: Arc::new(registry),
            resolver,
            store,
            channel,
            handle,
        });

        Self {
            services,
            monitor,
            runs_complete_queue: Queue::new(RUN_COMPLETE_QUEUE_SIZE),
            runs: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            _runtime: runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Starts the engine and begins processing events.
    ///
    /// This method:
    /// - Starts the event monitor
    /// - Begins listening on the event channel
    /// - Spawns a background task that drops completed runs from the active set
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        // Register handlers first, then start listening
        self.monitor.monitor();
        let runs_complete_queue = self.runs_complete_queue.clone();
        if let Ok(events) = ChannelEvent::channel(self.channel(), ChannelOptions::default()) {
            events.on_complete(move |run_id| {
                let _ = runs_complete_queue.send(run_id);
            });
        }
        self.services.channel.listen();

        let runs_complete_queue = self.runs_complete_queue.clone();
        let shutdown = self.shutdown.clone();
        let runs = self.runs.clone();
        self.services.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(run_id) = runs_complete_queue.next_async() => {
                        if let Ok(mut runs) = runs.write() {
                            runs.remove(&run_id);
                        }
                    }
                }
            }
        });
        info!("engine launched");
    }

    /// Gracefully shuts down the engine.
    ///
    /// Every active run is cancelled; the dispatchers finish them in the
    /// background. Stored run records stay readable.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.shutdown.shutdown();
        if let Ok(runs) = self.runs.read() {
            for run in runs.values() {
                let _ = run.cancel();
            }
        }
        self.services.channel.shutdown();
        info!("engine shut down");
    }

    /// Validates `graph`, creates a run for it and starts it.
    ///
    /// Validation problems are returned as [`PipeflowError::Validation`] and
    /// no run is created.
    pub fn submit(
        &self,
        graph: &GraphModel,
    ) -> Result<RunId> {
        let run = self.build_run(graph)?;
        self.run(run)
    }

    /// Validates `graph` and creates a run that stays pending until [`Engine::run`].
    pub fn build_run(
        &self,
        graph: &GraphModel,
    ) -> Result<Arc<Run>> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(PipeflowError::Engine("Engine is not running".to_string()));
        }

        let workflow = workflow::validate(graph).map_err(PipeflowError::Validation)?;
        for warning in workflow.warnings() {
            warn!("graph '{}': {}", workflow.id(), warning);
        }

        let run = Run::create(Arc::new(workflow), self.services.clone())?;
        self.runs.write().map_err(|e| PipeflowError::Engine(e.to_string()))?.insert(run.id().to_string(), run.clone());
        Ok(run)
    }

    /// Start a run created with [`Engine::build_run`] and return its id.
    pub fn run(
        &self,
        run: Arc<Run>,
    ) -> Result<RunId> {
        run.start()?;
        Ok(run.id().to_string())
    }

    /// Requests cancellation of a run.
    ///
    /// Cancelling a run that has already ended is a no-op; an unknown run is
    /// [`PipeflowError::NotFound`].
    pub fn cancel(
        &self,
        run_id: &str,
    ) -> Result<()> {
        let snapshot = self.services.store.snapshot(run_id)?;
        if snapshot.is_terminal() {
            return Ok(());
        }
        let run = self.runs.read().map_err(|e| PipeflowError::Engine(e.to_string()))?.get(run_id).cloned();
        match run {
            Some(run) => run.cancel(),
            // ended between the two lookups
            None if self.services.store.snapshot(run_id)?.is_terminal() => Ok(()),
            None => Err(PipeflowError::not_found("run", run_id)),
        }
    }

    /// Latest snapshot of a run.
    pub fn status(
        &self,
        run_id: &str,
    ) -> Result<RunSnapshot> {
        Ok(self.services.store.snapshot(run_id)?.as_ref().clone())
    }

    /// Every event of a run from the first one, then live until `RunEnded`.
    ///
    /// Dropping the stream releases the subscription.
    pub fn subscribe(
        &self,
        run_id: &str,
    ) -> Result<EventStream> {
        self.services.store.subscribe(run_id)
    }

    /// Every event of a run appended so far, without waiting for more.
    pub fn events(
        &self,
        run_id: &str,
    ) -> Result<Vec<Event>> {
        self.services.store.events(run_id)
    }

    /// Waits for a run to end and returns its final snapshot.
    pub async fn wait(
        &self,
        run_id: &str,
    ) -> Result<RunSnapshot> {
        let mut rx = self.services.store.find(run_id)?.watch();
        let snapshot = rx.wait_for(|s| s.is_terminal()).await.map_err(|e| PipeflowError::Run(e.to_string()))?;
        Ok(snapshot.as_ref().clone())
    }

    /// Ids of active runs followed by retained finished ones.
    pub fn run_ids(&self) -> Vec<RunId> {
        self.services.store.run_ids()
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.services.channel.clone()
    }

    pub fn registry(&self) -> Arc<ExecutorRegistry> {
        self.services.registry.clone()
    }

    pub fn config(&self) -> &Config {
        &self.services.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
