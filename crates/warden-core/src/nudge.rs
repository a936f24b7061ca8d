//! Three-level recovery for unresponsive workers.
//!
//! | Level | Action                                  | Needs a live handle |
//! |-------|-----------------------------------------|---------------------|
//! | 0     | write a no-op to the worker's input     | yes                 |
//! | 1     | write a `nudge` message to its hook     | no                  |
//! | 2     | kill the process (respawn is external)  | yes                 |
//!
//! Handles are registered independently of escalation, so the mailbox level
//! stays available for workers known only by name.
//!
//! Locking: the engine's map lock is only held to look up or swap a handle
//! and to append history. Worker I/O happens under the per-worker handle lock
//! alone, and hook writes happen under no lock at all.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::config::NudgeConfig;
use crate::error::{Error, Result};
use crate::hook::{HookMessage, HookStore};
use crate::model::ParseEnumError;
use crate::process::WorkerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NudgeLevel {
    Wake = 0,
    Mailbox = 1,
    Restart = 2,
}

impl NudgeLevel {
    /// Escalation order.
    pub const ALL: [Self; 3] = [Self::Wake, Self::Mailbox, Self::Restart];

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Wake => "wake",
            Self::Mailbox => "mailbox",
            Self::Restart => "restart",
        }
    }
}

impl TryFrom<u8> for NudgeLevel {
    type Error = ParseEnumError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Wake),
            1 => Ok(Self::Mailbox),
            2 => Ok(Self::Restart),
            other => Err(ParseEnumError {
                expected: "nudge level",
                got: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for NudgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `0`-`2` or the level name.
impl FromStr for NudgeLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<u8>() {
            return Self::try_from(number);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "wake" => Ok(Self::Wake),
            "mailbox" | "hook" => Ok(Self::Mailbox),
            "restart" | "kill" => Ok(Self::Restart),
            _ => Err(ParseEnumError {
                expected: "nudge level",
                got: s.to_string(),
            }),
        }
    }
}

/// One recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NudgeEvent {
    pub level: NudgeLevel,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type SharedHandle = Arc<Mutex<Box<dyn WorkerHandle>>>;

#[derive(Default)]
struct EngineState {
    handles: HashMap<String, SharedHandle>,
    history: HashMap<String, Vec<NudgeEvent>>,
}

/// Escalation engine keyed by worker mailbox name.
pub struct NudgeEngine {
    hooks: HookStore,
    config: NudgeConfig,
    state: Mutex<EngineState>,
}

impl fmt::Debug for NudgeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        let mut live: Vec<&String> = state.handles.keys().collect();
        live.sort();
        f.debug_struct("NudgeEngine")
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .field("live_handles", &live)
            .finish()
    }
}

impl NudgeEngine {
    #[must_use]
    pub fn new(hooks: HookStore, config: NudgeConfig) -> Self {
        Self {
            hooks,
            config,
            state: Mutex::new(EngineState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn hooks(&self) -> &HookStore {
        &self.hooks
    }

    /// Attach (or replace) the live handle for `name`. Passing `None` drops
    /// any previous handle but keeps the worker's history.
    pub fn register(&self, name: &str, handle: Option<Box<dyn WorkerHandle>>) {
        let mut state = self.lock();
        state.history.entry(name.to_string()).or_default();
        match handle {
            Some(handle) => {
                state
                    .handles
                    .insert(name.to_string(), Arc::new(Mutex::new(handle)));
                info!(worker = name, "live handle registered");
            }
            None => {
                state.handles.remove(name);
                info!(worker = name, "worker registered without handle");
            }
        }
    }

    /// Forget a worker's handle and history. Returns whether it was known.
    pub fn deregister(&self, name: &str) -> bool {
        let mut state = self.lock();
        let had_handle = state.handles.remove(name).is_some();
        let had_history = state.history.remove(name).is_some();
        had_handle || had_history
    }

    #[must_use]
    pub fn has_handle(&self, name: &str) -> bool {
        self.lock().handles.contains_key(name)
    }

    /// Recorded attempts for `name`, oldest first.
    #[must_use]
    pub fn history(&self, name: &str) -> Vec<NudgeEvent> {
        self.lock().history.get(name).cloned().unwrap_or_default()
    }

    /// Deliver an `assign` message to the worker's hook.
    ///
    /// # Errors
    ///
    /// Whatever [`HookStore::write`] returns.
    pub fn assign(&self, name: &str, item_id: &str, message: &str) -> Result<()> {
        self.hooks.write(name, &HookMessage::assign(item_id, message))
    }

    /// Attempt exactly one level. The attempt is recorded whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// [`Error::NoHandle`] for wake/restart without a live handle,
    /// [`Error::WorkerIo`] when the process rejects the action, or the hook
    /// write error for the mailbox level.
    pub fn nudge(&self, name: &str, level: NudgeLevel) -> Result<()> {
        let outcome = match level {
            NudgeLevel::Wake => self.wake(name),
            NudgeLevel::Mailbox => self.hooks.write(name, &HookMessage::nudge(&self.config.message)),
            NudgeLevel::Restart => self.restart(name),
        };

        let event = NudgeEvent {
            level,
            timestamp: Utc::now(),
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(ToString::to_string),
        };
        self.lock()
            .history
            .entry(name.to_string())
            .or_default()
            .push(event);

        match &outcome {
            Ok(()) => info!(worker = name, %level, "nudge delivered"),
            Err(err) => warn!(worker = name, %level, error = %err, "nudge failed"),
        }
        outcome
    }

    /// Try wake, mailbox, then restart, waiting the configured delay between
    /// attempts. Returns the level that worked.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] if `token` fires before or between attempts;
    /// otherwise the restart level's error when every level failed.
    pub fn nudge_escalating(&self, token: &CancelToken, name: &str) -> Result<NudgeLevel> {
        let delay = self.config.escalation_delay();
        let mut last_err = Error::Cancelled;

        for (attempt, level) in NudgeLevel::ALL.into_iter().enumerate() {
            let cancelled = if attempt == 0 {
                token.is_cancelled()
            } else {
                token.wait_timeout(delay)
            };
            if cancelled {
                info!(worker = name, %level, "escalation cancelled");
                return Err(Error::Cancelled);
            }

            match self.nudge(name, level) {
                Ok(()) => return Ok(level),
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }

    /// Kill every live handle and forget it. Histories are kept. Returns how
    /// many handles were killed; failures are logged.
    pub fn terminate_all(&self) -> usize {
        let handles: Vec<(String, SharedHandle)> = self.lock().handles.drain().collect();
        let mut stopped = 0;
        for (name, handle) in handles {
            let killed = handle.lock().unwrap_or_else(PoisonError::into_inner).kill();
            match killed {
                Ok(()) => {
                    info!(worker = %name, "worker stopped");
                    stopped += 1;
                }
                Err(err) => warn!(worker = %name, error = %err, "could not stop worker"),
            }
        }
        stopped
    }

    fn handle(&self, name: &str) -> Result<SharedHandle> {
        self.lock()
            .handles
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoHandle(name.to_string()))
    }

    fn wake(&self, name: &str) -> Result<()> {
        let handle = self.handle(name)?;
        let mut worker = handle.lock().unwrap_or_else(PoisonError::into_inner);
        worker
            .write_input(self.config.wake_input.as_bytes())
            .map_err(|source| Error::WorkerIo {
                worker: name.to_string(),
                source,
            })
    }

    fn restart(&self, name: &str) -> Result<()> {
        let handle = self
            .lock()
            .handles
            .remove(name)
            .ok_or_else(|| Error::NoHandle(name.to_string()))?;

        let killed = handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .kill();

        if let Err(source) = killed {
            self.lock()
                .handles
                .entry(name.to_string())
                .or_insert(handle);
            return Err(Error::WorkerIo {
                worker: name.to_string(),
                source,
            });
        }
        Ok(())
    }
}
