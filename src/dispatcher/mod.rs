//! Run scheduling.
//!
//! One [`Dispatcher`] task per run owns all node states. Workers execute
//! nodes and report back over a channel; the dispatcher turns every report
//! into state changes, log events and a fresh snapshot.

mod dispatcher;
mod retry;
mod worker;

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{Config, ExecutorRegistry, SecretResolver, runtime::Channel, store::Store};

pub(crate) use dispatcher::Dispatcher;

/// Engine-wide services every run uses.
pub(crate) struct Services {
    pub config: Config,
    pub registry: Arc<ExecutorRegistry>,
    pub resolver: SecretResolver,
    pub store: Arc<Store>,
    pub channel: Arc<Channel>,
    pub handle: Handle,
}
