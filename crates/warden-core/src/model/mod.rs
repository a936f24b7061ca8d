//! Persisted record types: work items, their audit events, and worker rows.

pub mod event;
pub mod item;
pub mod worker;

pub use event::{EventKind, ItemEvent};
pub use item::{
    ItemType, PRIORITY_DEFAULT, PRIORITY_HIGHEST, PRIORITY_LOWEST, ParseEnumError, Status, WorkItem,
};
pub use worker::{WorkerKind, WorkerRecord, WorkerStatus};
