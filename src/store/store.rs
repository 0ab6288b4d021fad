use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tokio::sync::watch;
use tracing::trace;

use crate::{
    PipeflowError, Result, ShareLock,
    common::MemCache,
    events::Event,
    runtime::{RunId, RunSnapshot},
    store::{EventStream, RunLog},
};

/// Event log and latest snapshot of one run.
pub struct RunRecord {
    log: Arc<RunLog>,
    snapshot: watch::Sender<Arc<RunSnapshot>>,
}

impl RunRecord {
    fn new(snapshot: RunSnapshot) -> Self {
        let (tx, _) = watch::channel(Arc::new(snapshot.clone()));
        Self {
            log: Arc::new(RunLog::new(snapshot.id)),
            snapshot: tx,
        }
    }

    pub fn log(&self) -> Arc<RunLog> {
        self.log.clone()
    }

    pub fn append(
        &self,
        event: Event,
    ) -> Result<Event> {
        self.log.append(event)
    }

    /// Replace the latest snapshot. Readers holding the previous one keep it.
    pub fn publish(
        &self,
        snapshot: RunSnapshot,
    ) {
        self.snapshot.send_if_modified(|current| {
            if **current == snapshot {
                return false;
            }
            *current = Arc::new(snapshot);
            true
        });
    }

    pub fn snapshot(&self) -> Arc<RunSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<RunSnapshot>> {
        self.snapshot.subscribe()
    }
}

/// Run records, split by lifecycle.
///
/// Records of runs that have not ended live in `active` and are never
/// evicted. [`Store::retire`] moves a finished run into `retained`, a bounded
/// cache that drops the least recently used records once it is full.
pub struct Store {
    active: ShareLock<HashMap<RunId, Arc<RunRecord>>>,
    retained: MemCache<RunId, Arc<RunRecord>>,
}

impl Store {
    pub fn new(capacity: usize) -> Self {
        Self {
            active: Arc::new(RwLock::new(HashMap::new())),
            retained: MemCache::new(capacity),
        }
    }

    /// Register a new run with its initial snapshot.
    pub fn create(
        &self,
        snapshot: RunSnapshot,
    ) -> Result<Arc<RunRecord>> {
        let mut active = self.active.write().map_err(|e| PipeflowError::Store(e.to_string()))?;
        if active.contains_key(&snapshot.id) || self.retained.contains(&snapshot.id) {
            return Err(PipeflowError::Store(format!("run '{}' already exists", snapshot.id)));
        }
        trace!("store::create({})", snapshot.id);
        let id = snapshot.id.clone();
        let record = Arc::new(RunRecord::new(snapshot));
        active.insert(id, record.clone());
        Ok(record)
    }

    /// Move an ended run into the bounded retention cache.
    pub fn retire(
        &self,
        run_id: &str,
    ) -> Result<()> {
        let mut active = self.active.write().map_err(|e| PipeflowError::Store(e.to_string()))?;
        let record = active.get(run_id).cloned().ok_or_else(|| PipeflowError::not_found("run", run_id))?;
        if !record.log.is_closed() {
            return Err(PipeflowError::Store(format!("run '{}' has not ended", run_id)));
        }
        trace!("store::retire({})", run_id);
        // visible in `retained` before it leaves `active`
        self.retained.set(run_id.to_string(), record);
        active.remove(run_id);
        Ok(())
    }

    pub fn find(
        &self,
        run_id: &str,
    ) -> Result<Arc<RunRecord>> {
        let active = self.active.read().map_err(|e| PipeflowError::Store(e.to_string()))?.get(run_id).cloned();
        active.or_else(|| self.retained.get(&run_id.to_string())).ok_or_else(|| PipeflowError::not_found("run", run_id))
    }

    pub fn snapshot(
        &self,
        run_id: &str,
    ) -> Result<Arc<RunSnapshot>> {
        Ok(self.find(run_id)?.snapshot())
    }

    pub fn subscribe(
        &self,
        run_id: &str,
    ) -> Result<EventStream> {
        Ok(self.find(run_id)?.log().subscribe())
    }

    /// Every event appended to a run so far.
    pub fn events(
        &self,
        run_id: &str,
    ) -> Result<Vec<Event>> {
        Ok(self.find(run_id)?.log().events())
    }

    /// Ids of active runs followed by retained ones.
    pub fn run_ids(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.active.read().map(|active| active.keys().cloned().collect()).unwrap_or_default();
        ids.extend(self.retained.iter().map(|(k, _)| (*k).clone()));
        ids
    }
}
