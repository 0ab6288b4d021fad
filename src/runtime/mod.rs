mod channel;
mod context;
mod run;
mod state;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use context::ExecutionContext;
pub use run::{Run, RunCommand, RunId};
pub use state::{NodeRunState, NodeStatus, RunSnapshot, RunStatus};
