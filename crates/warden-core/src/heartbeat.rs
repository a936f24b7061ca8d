//! Heartbeat drop box.
//!
//! Workers report liveness by atomically replacing
//! `<dir>/heartbeats/<encoded-id>.json` with their current [`WorkerRecord`].
//! Each worker owns its own file, so concurrent reporters never contend. The
//! patrol collects the directory each tick and folds it into the in-memory
//! registry, which is how the registry is rebuilt after a supervisor restart.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::atomic::{decode_file_stem, encode_file_stem, write_atomic};
use crate::error::{Error, Result};
use crate::model::WorkerRecord;

const HEARTBEATS_DIR: &str = "heartbeats";

#[derive(Debug, Clone)]
pub struct HeartbeatDir {
    dir: PathBuf,
}

impl HeartbeatDir {
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join(HEARTBEATS_DIR),
        }
    }

    fn path_for(&self, worker_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_stem(worker_id)))
    }

    /// Publish `record` as the worker's latest heartbeat.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty id, [`Error::Storage`] on I/O
    /// failure.
    pub fn publish(&self, record: &WorkerRecord) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(Error::validation("worker", "heartbeat needs a worker id"));
        }
        let path = self.path_for(&record.id);
        let bytes =
            serde_json::to_vec(record).map_err(|err| Error::storage(&path, err.into()))?;
        write_atomic(&path, &bytes)?;
        debug!(worker = %record.id, status = %record.status, "heartbeat published");
        Ok(())
    }

    /// Every readable heartbeat. Temp files, dotfiles and malformed records
    /// are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the directory exists but cannot be listed.
    pub fn collect(&self) -> Result<Vec<WorkerRecord>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::storage(&self.dir, err)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| Error::storage(&self.dir, err))?;
            let path = entry.path();
            let Some(stem) = heartbeat_stem(&path) else {
                continue;
            };

            match read_record(&path) {
                Ok(record) if Some(record.id.as_str()) == decode_file_stem(stem).as_deref() => {
                    records.push(record);
                }
                Ok(record) => {
                    warn!(path = %path.display(), id = %record.id, "heartbeat id does not match file name");
                }
                Err(reason) => {
                    warn!(path = %path.display(), %reason, "skipping unreadable heartbeat");
                }
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Remove a worker's heartbeat file. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the file exists but cannot be removed.
    pub fn remove(&self, worker_id: &str) -> Result<bool> {
        let path = self.path_for(worker_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::storage(&path, err)),
        }
    }
}

fn heartbeat_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    name.strip_suffix(".json")
}

fn read_record(path: &Path) -> std::result::Result<WorkerRecord, String> {
    let bytes = std::fs::read(path).map_err(|err| err.to_string())?;
    serde_json::from_slice(&bytes).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{WorkerKind, WorkerStatus};

    #[test]
    fn collect_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(HeartbeatDir::new(dir.path()).collect().unwrap().is_empty());
    }

    #[test]
    fn publish_then_collect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let beats = HeartbeatDir::new(dir.path());

        let mut sal = WorkerRecord::new("w-1", "sal", WorkerKind::Persistent);
        sal.status = WorkerStatus::Active;
        beats.publish(&sal).unwrap();
        beats
            .publish(&WorkerRecord::new("w 2", "", WorkerKind::Ephemeral))
            .unwrap();

        let records = beats.collect().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "w 2");
        assert_eq!(records[1], sal);
    }

    #[test]
    fn malformed_and_temp_files_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let beats = HeartbeatDir::new(dir.path());
        beats
            .publish(&WorkerRecord::new("ok", "ok", WorkerKind::Persistent))
            .unwrap();

        let raw = dir.path().join(HEARTBEATS_DIR);
        std::fs::write(raw.join("broken.json"), "{").unwrap();
        std::fs::write(raw.join(".ok.json.1.0.tmp"), "{").unwrap();
        std::fs::write(raw.join("notes.txt"), "hi").unwrap();

        let records = beats.collect().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "ok");
    }

    #[test]
    fn remove_reports_existence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let beats = HeartbeatDir::new(dir.path());
        beats
            .publish(&WorkerRecord::new("w-1", "sal", WorkerKind::Persistent))
            .unwrap();
        assert!(beats.remove("w-1").unwrap());
        assert!(!beats.remove("w-1").unwrap());
    }
}
