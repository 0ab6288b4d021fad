use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tokio::runtime::Handle;

use crate::{
    PipeflowError, Result, ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::Event,
    runtime::RunId,
};

macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        if let Ok(handlers) = $handles.read() {
            for handle in handlers.iter() {
                (handle)($(&$item),+);
            }
        }
    };
}

macro_rules! dispatch_event_async {
    ($handles:expr, $item:ident) => {
        let handlers = $handles.read().map(|h| h.clone()).unwrap_or_default();
        if !handlers.is_empty() {
            tokio::spawn(async move {
                for handle in handlers.iter() {
                    (handle)(&$item).await;
                }
            });
        }
    };
}

const EVENT_QUEUE_SIZE: usize = 4096;

pub type EventHandle = Arc<dyn Fn(&Event) + Send + Sync>;
pub type EventHandleAsync = Arc<dyn Fn(&Event) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the run id
    /// eg. run1*
    pub run_id: String,

    /// use the glob pattern to match the node id, run-level events have an empty node id
    /// eg. fetch*
    pub nid: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            run_id: "*".to_string(),
            nid: "*".to_string(),
        }
    }
}

impl ChannelOptions {
    pub fn new(
        run_id: impl Into<String>,
        nid: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            nid: nid.into(),
        }
    }

    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            nid: "*".to_string(),
        }
    }

    pub fn with_nid(nid: impl Into<String>) -> Self {
        Self {
            run_id: "*".to_string(),
            nid: nid.into(),
        }
    }
}

/// Engine-wide event fan-out.
///
/// Every event appended to a run log is also published here. A listener task
/// hands events to the registered handlers. The channel is best effort; a
/// handler that falls far behind may miss events, the run log never does.
#[derive(Clone)]
pub struct Channel {
    event_queue: Arc<BroadcastQueue<Event>>,

    events: ShareLock<Vec<EventHandle>>,
    events_async: ShareLock<Vec<EventHandleAsync>>,

    handle: Handle,
    shutdown: Arc<Shutdown>,
}

impl Channel {
    pub(crate) fn new(handle: Handle) -> Self {
        Self {
            event_queue: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            events: Arc::new(RwLock::new(Vec::new())),
            events_async: Arc::new(RwLock::new(Vec::new())),
            handle,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub(crate) fn publish(
        &self,
        event: Event,
    ) {
        // no subscriber is not an error
        let _ = self.event_queue.send(event);
    }

    pub(crate) fn listen(&self) {
        let mut event_queue = self.event_queue.subscribe();
        let events = self.events.clone();
        let events_async = self.events_async.clone();

        let shutdown = self.shutdown.clone();
        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    received = event_queue.recv() => match received {
                        Ok(e) => {
                            dispatch_event!(events, &e);
                            dispatch_event_async!(events_async, e);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("channel listener lagged, {} event(s) dropped", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// Handler registration filtered by run id and node id globs.
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    glob: (globset::GlobMatcher, globset::GlobMatcher),
}

impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        let compile = |pattern: &str| globset::Glob::new(pattern).map(|g| g.compile_matcher()).map_err(|e| PipeflowError::Config(format!("invalid channel pattern '{}': {}", pattern, e)));
        Ok(Self {
            glob: (compile(&options.run_id)?, compile(&options.nid)?),
            channel,
        })
    }

    /// Called with the run id once a run has ended, whatever its status.
    pub fn on_complete(
        &self,
        f: impl Fn(RunId) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();
        self.push(Arc::new(move |e| {
            if e.is_complete() && is_match(&glob, e) {
                f(e.run_id.clone());
            }
        }));
    }

    pub fn on_error(
        &self,
        f: impl Fn(&Event) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();
        self.push(Arc::new(move |e| {
            if e.is_error() && is_match(&glob, e) {
                f(e);
            }
        }));
    }

    pub fn on_event(
        &self,
        f: impl Fn(&Event) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();
        self.push(Arc::new(move |e| {
            if is_match(&glob, e) {
                f(e);
            }
        }));
    }

    /// Called for `NodeLog` events only.
    pub fn on_log(
        &self,
        f: impl Fn(&Event) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();
        self.push(Arc::new(move |e| {
            if e.is_log() && is_match(&glob, e) {
                f(e);
            }
        }));
    }

    pub fn on_event_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let glob = self.glob.clone();

        if let Ok(mut handlers) = self.channel.events_async.write() {
            handlers.push(Arc::new(move |e| {
                if is_match(&glob, e) {
                    f(e)
                } else {
                    Box::pin(async {})
                }
            }));
        }
    }

    fn push(
        &self,
        handle: EventHandle,
    ) {
        if let Ok(mut handlers) = self.channel.events.write() {
            handlers.push(handle);
        }
    }
}

fn is_match(
    glob: &(globset::GlobMatcher, globset::GlobMatcher),
    e: &Event,
) -> bool {
    let (pat_run, pat_nid) = glob;
    pat_run.is_match(&e.run_id) && pat_nid.is_match(e.nid.as_deref().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use crate::{
        RunStatus,
        events::{NodeEvent, RunEvent},
    };

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_channel_filters_by_glob() {
        let channel = Arc::new(Channel::new(Handle::current()));
        channel.listen();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        ChannelEvent::channel(channel.clone(), ChannelOptions::new("run-a*", "fetch*")).unwrap().on_event(move |e| s.lock().unwrap().push(e.name()));

        channel.publish(Event::node("run-a1", "fetch-1", NodeEvent::Ready));
        channel.publish(Event::node("run-a1", "parse", NodeEvent::Ready));
        channel.publish(Event::node("run-b1", "fetch-1", NodeEvent::Cancelled));
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec!["NodeReady".to_string()]);
        channel.shutdown();
    }

    #[tokio::test]
    async fn test_channel_complete_error_and_log_handlers() {
        let channel = Arc::new(Channel::new(Handle::current()));
        channel.listen();

        let completed = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(AtomicUsize::new(0));
        let logs = Arc::new(AtomicUsize::new(0));
        let asyncs = Arc::new(AtomicUsize::new(0));

        let ev = ChannelEvent::channel(channel.clone(), ChannelOptions::default()).unwrap();
        let c = completed.clone();
        ev.on_complete(move |run_id| c.lock().unwrap().push(run_id));
        let e = errors.clone();
        ev.on_error(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });
        let l = logs.clone();
        ev.on_log(move |_| {
            l.fetch_add(1, Ordering::SeqCst);
        });
        let a = asyncs.clone();
        ev.on_event_async(move |_| {
            let a = a.clone();
            Box::pin(async move {
                a.fetch_add(1, Ordering::SeqCst);
            })
        });

        channel.publish(Event::node("r1", "a", NodeEvent::Log {
            message: "hello".into(),
        }));
        channel.publish(Event::node("r1", "a", NodeEvent::Failed {
            error: crate::NodeError::execution("boom"),
        }));
        channel.publish(Event::run("r1", RunEvent::Ended {
            status: RunStatus::Failed,
        }));
        settle().await;

        assert_eq!(*completed.lock().unwrap(), vec!["r1".to_string()]);
        assert_eq!(errors.load(Ordering::SeqCst), 2);
        assert_eq!(logs.load(Ordering::SeqCst), 1);
        assert_eq!(asyncs.load(Ordering::SeqCst), 3);
        channel.shutdown();
    }

    #[test]
    fn test_invalid_pattern() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let channel = Arc::new(Channel::new(rt.handle().clone()));
        assert!(ChannelEvent::channel(channel, ChannelOptions::with_run_id("[")).is_err());
    }
}
