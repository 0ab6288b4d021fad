use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    ChannelEvent, ChannelOptions,
    events::{Event, GraphEvent, NodeEvent},
    runtime::Channel,
};

/// Writes every published event to the tracing subscriber.
pub struct Monitor {
    channel: Arc<Channel>,
}

impl Monitor {
    pub fn new(channel: Arc<Channel>) -> Self {
        Self {
            channel,
        }
    }

    pub fn monitor(&self) {
        match ChannelEvent::channel(self.channel.clone(), ChannelOptions::default()) {
            Ok(events) => events.on_event(record),
            Err(err) => warn!("monitor disabled: {}", err),
        }
    }
}

fn record(event: &Event) {
    let nid = event.nid.as_deref().unwrap_or("-");
    match &event.event {
        GraphEvent::Run(e) => info!(run_id = %event.run_id, seq = event.seq, "{} {:?}", event.name(), e),
        GraphEvent::Node(NodeEvent::Failed {
            error,
        }) => warn!(run_id = %event.run_id, seq = event.seq, nid, "{}: {}", event.name(), error),
        GraphEvent::Node(NodeEvent::Retrying {
            attempt,
            error,
            delay_ms,
        }) => warn!(run_id = %event.run_id, seq = event.seq, nid, "{}: attempt {} in {}ms after {}", event.name(), attempt, delay_ms, error),
        GraphEvent::Node(NodeEvent::Log {
            message,
        }) => info!(run_id = %event.run_id, seq = event.seq, nid, "{}", message),
        GraphEvent::Node(_) => debug!(run_id = %event.run_id, seq = event.seq, nid, "{}", event.name()),
    }
}
