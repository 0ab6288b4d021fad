use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::debug;

use crate::{
    PipeflowError, Result,
    common::Queue,
    dispatcher::{Dispatcher, Services},
    runtime::RunSnapshot,
    utils,
    workflow::Workflow,
};

/// Start and Cancel are each sent at most once.
const COMMAND_QUEUE_SIZE: usize = 4;

pub type RunId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommand {
    Start,
    Cancel,
}

/// Handle to one execution of a workflow.
///
/// The run itself is driven by its dispatcher task; this handle only feeds it
/// commands. `start` and `cancel` each take effect at most once.
pub struct Run {
    id: RunId,
    workflow: Arc<Workflow>,
    command_queue: Arc<Queue<RunCommand>>,
    started: AtomicBool,
    cancel_requested: AtomicBool,
}

impl Run {
    pub(crate) fn new(
        id: RunId,
        workflow: Arc<Workflow>,
        command_queue: Arc<Queue<RunCommand>>,
    ) -> Self {
        Self {
            id,
            workflow,
            command_queue,
            started: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Create a paused run: its record is stored with every node waiting and
    /// its dispatcher is spawned, but nothing executes before [`Run::start`].
    pub(crate) fn create(
        workflow: Arc<Workflow>,
        services: Arc<Services>,
    ) -> Result<Arc<Self>> {
        let id = utils::longid();
        let record = services.store.create(RunSnapshot::pending(&id, &workflow))?;
        let command_queue = Queue::new(COMMAND_QUEUE_SIZE);

        Dispatcher::new(id.clone(), workflow.clone(), record, services).start(command_queue.clone());
        debug!("run::create({})", id);

        Ok(Arc::new(Self::new(id, workflow, command_queue)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workflow(&self) -> Arc<Workflow> {
        self.workflow.clone()
    }

    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PipeflowError::Run(format!("run '{}' has already been started", self.id)));
        }
        debug!("run::start({})", self.id);
        self.command_queue.send(RunCommand::Start)
    }

    pub fn cancel(&self) -> Result<()> {
        if self.cancel_requested.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("run::cancel({})", self.id);
        self.command_queue.send(RunCommand::Cancel)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}
