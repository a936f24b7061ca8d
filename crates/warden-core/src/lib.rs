//! warden-core library.
//!
//! A dependency-aware work-item store plus the supervision engine that keeps
//! the workers executing those items alive.
//!
//! - [`store`]: persisted items, audit history, ready-set computation
//! - [`hook`]: per-worker single-slot mailbox files
//! - [`registry`] and [`heartbeat`]: who is alive and when they last said so
//! - [`nudge`]: wake → mailbox → restart escalation
//! - [`patrol`]: the periodic loop tying the above together
//!
//! # Conventions
//!
//! - **Errors**: library calls return [`Result`] over [`Error`]; every
//!   variant maps to a stable [`error::ErrorCode`].
//! - **Logging**: `tracing` macros only. Reads log at `debug!`, mutations
//!   and recoveries at `info!`, skipped records and stale workers at `warn!`.

pub mod atomic;
pub mod cancel;
pub mod config;
pub mod error;
pub mod graph;
pub mod heartbeat;
pub mod hook;
pub mod lock;
pub mod model;
pub mod nudge;
pub mod patrol;
pub mod process;
pub mod registry;
pub mod store;

pub use error::{Error, Result};
