use std::sync::{Arc, RwLock};

use futures::StreamExt;
use tokio::sync::watch;
use tracing::trace;

use crate::{PipeflowError, Result, events::Event, runtime::RunId, store::EventStream};

/// Append-only event log of one run.
///
/// Sequence numbers are assigned on append. Once a `RunEnded` event has been
/// appended the log is closed and further appends fail.
pub struct RunLog {
    run_id: RunId,
    events: RwLock<Vec<Event>>,
    len: watch::Sender<usize>,
}

impl RunLog {
    pub fn new(run_id: impl Into<RunId>) -> Self {
        let (len, _) = watch::channel(0);
        Self {
            run_id: run_id.into(),
            events: RwLock::new(Vec::new()),
            len,
        }
    }

    /// Append `event`, returning it with its assigned sequence number.
    pub fn append(
        &self,
        mut event: Event,
    ) -> Result<Event> {
        let len = {
            let mut events = self.events.write().map_err(|e| PipeflowError::Store(e.to_string()))?;
            if events.last().is_some_and(|e| e.is_complete()) {
                return Err(PipeflowError::Store(format!("run log '{}' is closed", self.run_id)));
            }
            event.seq = events.len() as u64;
            events.push(event.clone());
            events.len()
        };
        trace!("log::append({}, seq={}, {})", self.run_id, event.seq, event.name());
        self.len.send_replace(len);
        Ok(event)
    }

    pub fn get(
        &self,
        seq: usize,
    ) -> Option<Event> {
        self.events.read().ok().and_then(|events| events.get(seq).cloned())
    }

    pub fn is_closed(&self) -> bool {
        self.events.read().map(|events| events.last().is_some_and(|e| e.is_complete())).unwrap_or(true)
    }

    /// A copy of every event appended so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    /// Stream the log from the first event, following live appends until
    /// `RunEnded`. Dropping the stream releases everything it holds.
    pub fn subscribe(self: &Arc<Self>) -> EventStream {
        let rx = self.len.subscribe();
        futures::stream::unfold((self.clone(), 0usize, rx, false), |(log, pos, mut rx, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(event) = log.get(pos) {
                    let done = event.is_complete();
                    return Some((event, (log, pos + 1, rx, done)));
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        RunStatus,
        events::{NodeEvent, RunEvent},
    };

    fn ended() -> Event {
        Event::run("r1", RunEvent::Ended {
            status: RunStatus::Succeeded,
        })
    }

    #[test]
    fn test_append_assigns_seq_and_closes() {
        let log = RunLog::new("r1");
        let first = log
            .append(Event::run("r1", RunEvent::Started {
                node_ids: vec![],
            }))
            .unwrap();
        assert_eq!(first.seq, 0);
        let last = log.append(ended()).unwrap();
        assert_eq!(last.seq, 1);
        assert!(log.is_closed());

        let err = log.append(Event::node("r1", "a", NodeEvent::Ready)).unwrap_err();
        assert!(matches!(err, PipeflowError::Store(_)));
        assert_eq!(log.events().len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_replays_then_follows() {
        let log = Arc::new(RunLog::new("r1"));
        log.append(Event::run("r1", RunEvent::Started {
            node_ids: vec!["a".into()],
        }))
        .unwrap();

        let mut stream = log.subscribe();
        assert_eq!(stream.next().await.map(|e| e.seq), Some(0));

        let writer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.append(Event::node("r1", "a", NodeEvent::Ready)).unwrap();
            writer.append(ended()).unwrap();
        });

        let rest: Vec<u64> = stream.map(|e| e.seq).collect().await;
        assert_eq!(rest, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_subscribe_to_closed_log_is_finite() {
        let log = Arc::new(RunLog::new("r1"));
        log.append(ended()).unwrap();
        let events: Vec<Event> = log.subscribe().collect().await;
        assert_eq!(events.len(), 1);
        // a second subscriber gets the same replay
        let again: Vec<Event> = log.subscribe().collect().await;
        assert_eq!(events, again);
    }

    #[tokio::test]
    async fn test_dropped_subscription_does_not_block_writer() {
        let log = Arc::new(RunLog::new("r1"));
        let stream = log.subscribe();
        drop(stream);
        for _ in 0..100 {
            log.append(Event::node("r1", "a", NodeEvent::Ready)).unwrap();
        }
        assert_eq!(Arc::strong_count(&log), 1);
        assert_eq!(log.events().len(), 100);
    }
}
