//! Per-worker assignment mailbox.
//!
//! Each named worker owns at most one pending message at
//! `<dir>/hooks/<encoded-name>.json`. Writers replace the file atomically;
//! workers poll it. There is no acknowledgment: a second write before the
//! worker reads simply overwrites the first.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::atomic::{encode_file_stem, write_atomic};
use crate::error::{Error, Result};
use crate::model::ParseEnumError;

const HOOKS_DIR: &str = "hooks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    /// Hand a work item to the worker.
    Assign,
    /// Ask the worker to re-read its state and carry on.
    Nudge,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Assign => "assign",
            Self::Nudge => "nudge",
        })
    }
}

impl FromStr for HookKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assign" => Ok(Self::Assign),
            "nudge" => Ok(Self::Nudge),
            _ => Err(ParseEnumError {
                expected: "hook kind",
                got: s.to_string(),
            }),
        }
    }
}

/// The single pending message for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookMessage {
    #[serde(rename = "type")]
    pub kind: HookKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bead_id: Option<String>,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HookMessage {
    #[must_use]
    pub fn assign(item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: HookKind::Assign,
            bead_id: Some(item_id.into()),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn nudge(message: impl Into<String>) -> Self {
        Self {
            kind: HookKind::Nudge,
            bead_id: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Directory of hook files.
#[derive(Debug, Clone)]
pub struct HookStore {
    dir: PathBuf,
}

impl HookStore {
    /// Hooks live under `<state_dir>/hooks/`.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join(HOOKS_DIR),
        }
    }

    #[must_use]
    pub fn path_for(&self, worker: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_stem(worker)))
    }

    /// Replace the worker's pending message.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty worker name, [`Error::Storage`]
    /// when the file cannot be written.
    pub fn write(&self, worker: &str, message: &HookMessage) -> Result<()> {
        if worker.trim().is_empty() {
            return Err(Error::validation("worker", "hook needs a worker name"));
        }
        let path = self.path_for(worker);
        let bytes = serde_json::to_vec_pretty(message)
            .map_err(|err| Error::storage(&path, err.into()))?;
        write_atomic(&path, &bytes)?;
        info!(worker, kind = %message.kind, bead_id = ?message.bead_id, "hook written");
        Ok(())
    }

    /// The worker's pending message, if any. A corrupt file reads as none.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the file exists but cannot be read.
    pub fn read(&self, worker: &str) -> Result<Option<HookMessage>> {
        let path = self.path_for(worker);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::storage(&path, err)),
        };
        match serde_json::from_slice(&content) {
            Ok(message) => Ok(Some(message)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable hook");
                Ok(None)
            }
        }
    }

    /// Read and clear in one step.
    ///
    /// # Errors
    ///
    /// Same as [`HookStore::read`] and [`HookStore::clear`].
    pub fn take(&self, worker: &str) -> Result<Option<HookMessage>> {
        let message = self.read(worker)?;
        if message.is_some() {
            self.clear(worker)?;
            debug!(worker, "hook consumed");
        }
        Ok(message)
    }

    /// Remove the worker's message. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the file exists but cannot be removed.
    pub fn clear(&self, worker: &str) -> Result<bool> {
        let path = self.path_for(worker);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::storage(&path, err)),
        }
    }
}
