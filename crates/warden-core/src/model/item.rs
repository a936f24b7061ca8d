use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::event::{EventKind, ItemEvent};

/// Highest (most urgent) priority.
pub const PRIORITY_HIGHEST: u8 = 0;
/// Lowest priority.
pub const PRIORITY_LOWEST: u8 = 4;
/// Priority given to items created without one.
pub const PRIORITY_DEFAULT: u8 = 2;

/// The five lifecycle states of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    PendingApproval,
    Closed,
}

impl Status {
    pub const ALL: [Self; 5] = [
        Self::Open,
        Self::InProgress,
        Self::Blocked,
        Self::PendingApproval,
        Self::Closed,
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::PendingApproval => "pending_approval",
            Self::Closed => "closed",
        }
    }

    /// Whether the item still holds its outgoing `blocks` edges.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Free-form type tag with the common kinds named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Task,
    Bug,
    Feature,
    Epic,
    Chore,
}

impl ItemType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Epic => "epic",
            Self::Chore => "chore",
        }
    }
}

/// A persisted work item together with its audit history.
///
/// `blocks` is the forward dependency edge: every id listed here stays out of
/// the ready set until this item is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: u8,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub assignee: String,
    #[serde(with = "csv_labels")]
    pub labels: Vec<String>,
    pub turf: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub blocks: Vec<String>,
    pub related: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovered_from: Option<String>,
    pub history: Vec<ItemEvent>,
}

impl Default for WorkItem {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            description: String::new(),
            status: Status::Open,
            priority: PRIORITY_DEFAULT,
            item_type: ItemType::Task,
            assignee: String::new(),
            labels: Vec::new(),
            turf: String::new(),
            branch: String::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            closed_at: None,
            created_by: None,
            close_reason: None,
            parent_id: None,
            blocks: Vec::new(),
            related: Vec::new(),
            discovered_from: None,
            history: Vec::new(),
        }
    }
}

impl WorkItem {
    /// A fresh, unsaved item with default priority and status `open`.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn in_turf(mut self, turf: impl Into<String>) -> Self {
        self.turf = turf.into();
        self
    }

    /// Add a forward edge: `target` cannot become ready until this item closes.
    #[must_use]
    pub fn blocking(mut self, target: impl Into<String>) -> Self {
        self.blocks.push(target.into());
        self
    }

    /// Events of the given kind, in history order.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &ItemEvent> {
        self.history.iter().filter(move |event| event.kind == kind)
    }

    /// Check the fields callers are allowed to set freely.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty title or a priority outside 0-4.
    pub fn validate(&self) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::Error::validation("title", "must not be empty"));
        }
        if self.priority > PRIORITY_LOWEST {
            return Err(crate::Error::validation(
                "priority",
                format!(
                    "{} is outside {PRIORITY_HIGHEST}-{PRIORITY_LOWEST}",
                    self.priority
                ),
            ));
        }
        if self.blocks.iter().any(|target| target == &self.id) && !self.id.is_empty() {
            return Err(crate::Error::validation("blocks", "an item cannot block itself"));
        }
        Ok(())
    }
}

/// Labels are stored as a single comma-separated string on disk.
mod csv_labels {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(labels: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&labels.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(ToString::to_string)
            .collect())
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl From<ParseEnumError> for crate::Error {
    fn from(err: ParseEnumError) -> Self {
        Self::validation(err.expected, format!("unknown value '{}'", err.got))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase().replace('-', "_")
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "doing" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "pending_approval" => Ok(Self::PendingApproval),
            "closed" | "done" => Ok(Self::Closed),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for ItemType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "epic" => Ok(Self::Epic),
            "chore" => Ok(Self::Chore),
            _ => Err(ParseEnumError {
                expected: "type",
                got: s.to_string(),
            }),
        }
    }
}
