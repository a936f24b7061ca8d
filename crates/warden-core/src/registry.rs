//! In-memory index of known workers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{WorkerRecord, WorkerStatus};

/// Id-indexed table of [`WorkerRecord`]s behind one mutex.
///
/// Every method takes the lock, does its work, and releases it before
/// returning; nothing here calls out while holding it.
#[derive(Debug, Default)]
pub struct Registry {
    workers: Mutex<HashMap<String, WorkerRecord>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WorkerRecord>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a worker record.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty id.
    pub fn register(&self, record: WorkerRecord) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(Error::validation("worker", "id must not be empty"));
        }
        info!(worker = %record.id, name = %record.name, kind = %record.kind, "worker registered");
        self.lock().insert(record.id.clone(), record);
        Ok(())
    }

    /// Record a liveness report and return the updated row.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unregistered id.
    pub fn heartbeat(&self, id: &str, status: WorkerStatus, task: &str) -> Result<WorkerRecord> {
        let mut workers = self.lock();
        let record = workers
            .get_mut(id)
            .ok_or_else(|| Error::worker_not_found(id))?;
        record.status = status;
        task.clone_into(&mut record.task);
        record.last_ping = Utc::now();
        debug!(worker = id, %status, "heartbeat");
        Ok(record.clone())
    }

    /// Remove a worker; returns its last record.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unregistered id.
    pub fn deregister(&self, id: &str) -> Result<WorkerRecord> {
        let removed = self
            .lock()
            .remove(id)
            .ok_or_else(|| Error::worker_not_found(id))?;
        info!(worker = id, "worker deregistered");
        Ok(removed)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<WorkerRecord> {
        self.lock().get(id).cloned()
    }

    /// First worker whose declared name is `name`.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<WorkerRecord> {
        let workers = self.lock();
        let mut matches: Vec<&WorkerRecord> =
            workers.values().filter(|record| record.name == name).collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.first().map(|record| (*record).clone())
    }

    /// All workers sorted by id.
    #[must_use]
    pub fn list(&self) -> Vec<WorkerRecord> {
        let mut records: Vec<WorkerRecord> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Set a worker's status to stuck. Returns false for unknown ids.
    pub fn mark_stuck(&self, id: &str) -> bool {
        self.lock().get_mut(id).is_some_and(|record| {
            record.status = WorkerStatus::Stuck;
            true
        })
    }

    /// Workers whose last heartbeat is older than `threshold` at `now`.
    #[must_use]
    pub fn stale(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<WorkerRecord> {
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        let mut stale: Vec<WorkerRecord> = self
            .lock()
            .values()
            .filter(|record| now.signed_duration_since(record.last_ping) > threshold)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.id.cmp(&b.id));
        stale
    }

    /// Fold externally collected records in. A record replaces the current
    /// row only when its `last_ping` is newer; unknown workers are added.
    /// Returns how many rows changed.
    pub fn ingest(&self, records: impl IntoIterator<Item = WorkerRecord>) -> usize {
        let mut workers = self.lock();
        let mut changed = 0;
        for record in records {
            let newer = workers
                .get(&record.id)
                .is_none_or(|current| record.last_ping > current.last_ping);
            if newer {
                workers.insert(record.id.clone(), record);
                changed += 1;
            }
        }
        changed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
