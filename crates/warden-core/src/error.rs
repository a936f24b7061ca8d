use std::fmt;
use std::io;
use std::path::PathBuf;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    ItemNotFound,
    WorkerNotFound,
    InvalidValue,
    StorageFailed,
    LockContention,
    NoLiveHandle,
    EscalationCancelled,
    WorkerIoFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ItemNotFound => "E2001",
            Self::WorkerNotFound => "E2002",
            Self::InvalidValue => "E2005",
            Self::StorageFailed => "E5001",
            Self::LockContention => "E5002",
            Self::NoLiveHandle => "E7001",
            Self::EscalationCancelled => "E7002",
            Self::WorkerIoFailed => "E7003",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::ItemNotFound => "Item not found",
            Self::WorkerNotFound => "Worker not found",
            Self::InvalidValue => "Invalid value",
            Self::StorageFailed => "Storage read/write failed",
            Self::LockContention => "Lock contention",
            Self::NoLiveHandle => "Worker has no live handle",
            Self::EscalationCancelled => "Escalation cancelled",
            Self::WorkerIoFailed => "Worker process I/O failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `wd init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .warden/config.toml and retry."),
            Self::ItemNotFound | Self::WorkerNotFound | Self::EscalationCancelled => None,
            Self::InvalidValue => {
                Some("Use one of the documented status/type values and a priority of 0-4.")
            }
            Self::StorageFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other `wd` process releases its lock."),
            Self::NoLiveHandle => {
                Some("Use --level 1 to deliver through the hook mailbox instead.")
            }
            Self::WorkerIoFailed => Some("The worker process may have exited; try --level 2."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the store, hooks, registry and nudge engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown work-item or worker identifier.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Malformed filter, illegal status value, out-of-range priority.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// I/O failure reading or writing a backing file.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Wake or restart attempted on a worker with no live handle.
    #[error("worker '{0}' has no live handle")]
    NoHandle(String),

    /// Escalation aborted by its cancellation token.
    #[error("escalation cancelled")]
    Cancelled,

    /// Writing to or terminating a live worker process failed.
    #[error("worker '{worker}' I/O failed: {source}")]
    WorkerIo {
        worker: String,
        #[source]
        source: io::Error,
    },

    /// Config file could not be parsed.
    #[error("failed to parse {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

impl Error {
    pub(crate) fn item_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "item",
            id: id.into(),
        }
    }

    pub(crate) fn worker_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "worker",
            id: id.into(),
        }
    }

    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { kind: "worker", .. } => ErrorCode::WorkerNotFound,
            Self::NotFound { .. } => ErrorCode::ItemNotFound,
            Self::Validation { .. } => ErrorCode::InvalidValue,
            Self::Storage { source, .. } if matches!(source.kind(), io::ErrorKind::WouldBlock) => {
                ErrorCode::LockContention
            }
            Self::Storage { .. } => ErrorCode::StorageFailed,
            Self::NoHandle(_) => ErrorCode::NoLiveHandle,
            Self::Cancelled => ErrorCode::EscalationCancelled,
            Self::WorkerIo { .. } => ErrorCode::WorkerIoFailed,
            Self::Config { .. } => ErrorCode::ConfigParseError,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
