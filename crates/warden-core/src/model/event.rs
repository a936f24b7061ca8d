use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::item::{ParseEnumError, normalize};

/// What happened to a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    StatusChanged,
    Assigned,
    Commented,
    WorkStarted,
    WorkCompleted,
}

impl EventKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::StatusChanged => "status_changed",
            Self::Assigned => "assigned",
            Self::Commented => "commented",
            Self::WorkStarted => "work_started",
            Self::WorkCompleted => "work_completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "created" => Ok(Self::Created),
            "status_changed" => Ok(Self::StatusChanged),
            "assigned" => Ok(Self::Assigned),
            "commented" => Ok(Self::Commented),
            "work_started" => Ok(Self::WorkStarted),
            "work_completed" => Ok(Self::WorkCompleted),
            _ => Err(ParseEnumError {
                expected: "event type",
                got: s.to_string(),
            }),
        }
    }
}

/// One audit entry embedded in a work item's history.
///
/// `id` and `timestamp` may be left empty by callers; the store fills them
/// when the event is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ItemEvent {
    #[must_use]
    pub fn new(kind: EventKind, actor: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            timestamp: None,
            kind,
            actor: actor.into(),
            from: None,
            to: None,
            comment: None,
        }
    }

    #[must_use]
    pub fn transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self.to = Some(to.into());
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Whether the store still needs to stamp an id or timestamp.
    #[must_use]
    pub fn is_unstamped(&self) -> bool {
        self.id.is_empty() || self.timestamp.is_none()
    }
}
