use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::item::{ParseEnumError, normalize};

/// Whether a worker outlives the items it works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    #[default]
    Persistent,
    Ephemeral,
}

/// Health as last reported or inferred by patrol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    #[default]
    Idle,
    Stuck,
}

impl WorkerKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Ephemeral => "ephemeral",
        }
    }
}

impl WorkerStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Stuck => "stuck",
        }
    }
}

/// A registry row for one known worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: WorkerKind,
    #[serde(default)]
    pub status: WorkerStatus,
    #[serde(default)]
    pub task: String,
    pub last_ping: DateTime<Utc>,
}

impl WorkerRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: WorkerKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            status: WorkerStatus::Idle,
            task: String::new(),
            last_ping: Utc::now(),
        }
    }

    /// Key used for the worker's hook mailbox: its name, or its id when anonymous.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "persistent" => Ok(Self::Persistent),
            "ephemeral" => Ok(Self::Ephemeral),
            _ => Err(ParseEnumError {
                expected: "worker type",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for WorkerStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "active" => Ok(Self::Active),
            "idle" => Ok(Self::Idle),
            "stuck" => Ok(Self::Stuck),
            _ => Err(ParseEnumError {
                expected: "worker status",
                got: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_worker_uses_id_as_mailbox() {
        let named = WorkerRecord::new("w-1", "sal", WorkerKind::Persistent);
        let anon = WorkerRecord::new("w-2", "", WorkerKind::Ephemeral);
        assert_eq!(named.mailbox(), "sal");
        assert_eq!(anon.mailbox(), "w-2");
    }

    #[test]
    fn record_wire_shape() {
        let record = WorkerRecord::new("w-1", "sal", WorkerKind::Ephemeral);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "ephemeral");
        assert_eq!(json["status"], "idle");
        assert!(json["last_ping"].is_string());
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert_eq!("STUCK".parse::<WorkerStatus>().unwrap(), WorkerStatus::Stuck);
        assert!("dead".parse::<WorkerStatus>().is_err());
    }
}
