//! Periodic supervision of known workers.
//!
//! One tick:
//!
//! 1. join escalation threads that have exited, then fold the heartbeat
//!    drop box into the registry;
//! 2. settle outcomes of escalations that finished since the last tick;
//! 3. mark every worker quiet for longer than `stale_after` as stuck and
//!    start an escalation thread for it, unless one is already running;
//! 4. stamp every known worker's last-check time.
//!
//! A tick never waits on an escalation. Escalations report back through the
//! shared state and their outcome drives the next tick: a worker that was
//! killed and could not be respawned is deregistered there.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::{PatrolConfig, ProjectConfig, WorkerSpec};
use crate::error::Result;
use crate::heartbeat::HeartbeatDir;
use crate::hook::HookStore;
use crate::model::{WorkerKind, WorkerRecord, WorkerStatus};
use crate::nudge::{NudgeEngine, NudgeLevel};
use crate::process::{Spawner, WorkerCommand, WorkerHandle};
use crate::registry::Registry;

/// How an escalation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// Wake or mailbox worked.
    Recovered { level: NudgeLevel },
    /// Killed and started again with resume arguments.
    Respawned,
    /// Killed with nothing configured to restart it.
    Terminated,
    /// Every level failed.
    Failed { error: String },
    /// Shutdown interrupted the escalation.
    Cancelled,
}

/// What one tick saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatrolReport {
    pub checked: usize,
    pub ingested: usize,
    pub stale: Vec<String>,
    pub escalated: Vec<String>,
    pub in_flight: Vec<String>,
    pub finished: Vec<FinishedEscalation>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishedEscalation {
    pub worker: String,
    #[serde(flatten)]
    pub outcome: EscalationOutcome,
}

#[derive(Default)]
struct PatrolState {
    in_flight: HashSet<String>,
    finished: Vec<FinishedEscalation>,
    last_check: HashMap<String, DateTime<Utc>>,
    threads: Vec<JoinHandle<()>>,
}

/// Supervisor owning the registry and the nudge engine.
pub struct Patrol {
    config: PatrolConfig,
    registry: Arc<Registry>,
    engine: Arc<NudgeEngine>,
    heartbeats: HeartbeatDir,
    spawner: Arc<dyn Spawner>,
    workers: Arc<[WorkerSpec]>,
    state: Arc<Mutex<PatrolState>>,
}

impl std::fmt::Debug for Patrol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patrol")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("engine", &self.engine)
            .field("heartbeats", &self.heartbeats)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

fn lock_state(state: &Mutex<PatrolState>) -> MutexGuard<'_, PatrolState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Patrol {
    #[must_use]
    pub fn new(state_dir: &Path, config: &ProjectConfig, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            config: config.patrol.clone(),
            registry: Arc::new(Registry::new()),
            engine: Arc::new(NudgeEngine::new(
                HookStore::new(state_dir),
                config.nudge.clone(),
            )),
            heartbeats: HeartbeatDir::new(state_dir),
            spawner,
            workers: config.workers.clone().into(),
            state: Arc::new(Mutex::new(PatrolState::default())),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn engine(&self) -> &NudgeEngine {
        &self.engine
    }

    /// Register a worker with both the registry and the nudge engine.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Validation`] for an empty id.
    pub fn register_worker(
        &self,
        id: &str,
        name: &str,
        kind: WorkerKind,
        handle: Option<Box<dyn WorkerHandle>>,
    ) -> Result<WorkerRecord> {
        let record = WorkerRecord::new(id, name, kind);
        self.registry.register(record.clone())?;
        self.engine.register(record.mailbox(), handle);
        Ok(record)
    }

    /// Record a liveness report for a registered worker.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] for an unknown id.
    pub fn heartbeat(&self, id: &str, status: WorkerStatus, task: &str) -> Result<WorkerRecord> {
        self.registry.heartbeat(id, status, task)
    }

    /// Drop a worker everywhere the patrol tracks it, including its
    /// heartbeat file so the next tick does not resurrect it.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] for an unknown id.
    pub fn deregister_worker(&self, id: &str) -> Result<WorkerRecord> {
        let record = self.registry.deregister(id)?;
        self.engine.deregister(record.mailbox());
        if let Err(err) = self.heartbeats.remove(id) {
            warn!(worker = id, error = %err, "could not remove heartbeat file");
        }
        lock_state(&self.state).last_check.remove(id);
        Ok(record)
    }

    /// Start every configured persistent worker that has a command.
    /// Returns how many started; failures are logged.
    pub fn launch_configured(&self) -> usize {
        let mut launched = 0;
        for spec in self.workers.iter().filter(|s| s.kind == WorkerKind::Persistent) {
            let Some(command) = WorkerCommand::from_spec(spec) else {
                continue;
            };
            match self.spawner.spawn(&command) {
                Ok(handle) => {
                    if let Err(err) = self.register_worker(&spec.name, &spec.name, spec.kind, Some(handle)) {
                        warn!(worker = %spec.name, error = %err, "could not register launched worker");
                        continue;
                    }
                    launched += 1;
                }
                Err(err) => warn!(worker = %spec.name, error = %err, "failed to launch worker"),
            }
        }
        launched
    }

    /// Last time each worker was examined by a tick.
    #[must_use]
    pub fn last_checked(&self, id: &str) -> Option<DateTime<Utc>> {
        lock_state(&self.state).last_check.get(id).copied()
    }

    /// Run one supervision pass. Escalations started here run on their own
    /// threads and are cancelled through `token`.
    pub fn tick(&self, token: &CancelToken) -> PatrolReport {
        let mut report = PatrolReport::default();
        self.reap_escalations();

        match self.heartbeats.collect() {
            Ok(records) => report.ingested = self.registry.ingest(records),
            Err(err) => warn!(error = %err, "could not read heartbeats"),
        }

        for done in self.take_finished() {
            if done.outcome == EscalationOutcome::Terminated {
                match self.deregister_worker(&done.worker) {
                    Ok(_) => report.removed.push(done.worker.clone()),
                    Err(err) => debug!(worker = %done.worker, error = %err, "terminated worker already gone"),
                }
            }
            report.finished.push(done);
        }

        let now = Utc::now();
        for record in self.registry.stale(now, self.config.stale_after()) {
            report.stale.push(record.id.clone());
            self.registry.mark_stuck(&record.id);

            if !lock_state(&self.state).in_flight.insert(record.id.clone()) {
                report.in_flight.push(record.id);
                continue;
            }

            let age = now.signed_duration_since(record.last_ping).num_seconds();
            warn!(worker = %record.id, age_secs = age, "worker stale, escalating");
            match self.start_escalation(token, record.clone()) {
                Ok(()) => report.escalated.push(record.id),
                Err(err) => {
                    warn!(worker = %record.id, error = %err, "could not start escalation thread");
                    lock_state(&self.state).in_flight.remove(&record.id);
                }
            }
        }

        let known = self.registry.list();
        report.checked = known.len();
        let mut state = lock_state(&self.state);
        for record in known {
            state.last_check.insert(record.id, now);
        }
        drop(state);

        debug!(
            checked = report.checked,
            stale = report.stale.len(),
            escalated = report.escalated.len(),
            "patrol tick"
        );
        report
    }

    /// Tick every interval until `token` is cancelled, then wait for
    /// in-flight escalations to wind down and stop every live worker.
    pub fn run(&self, token: &CancelToken) {
        info!(interval_secs = self.config.interval_secs, "patrol started");
        loop {
            self.tick(token);
            if token.wait_timeout(self.config.interval()) {
                break;
            }
        }
        self.join_escalations();
        let stopped = self.engine.terminate_all();
        info!(stopped, "patrol stopped");
    }

    /// Run the loop on a dedicated thread.
    ///
    /// # Errors
    ///
    /// The OS error if the thread cannot be created.
    pub fn spawn(self: &Arc<Self>, token: CancelToken) -> io::Result<JoinHandle<()>> {
        let patrol = Arc::clone(self);
        thread::Builder::new()
            .name("warden-patrol".into())
            .spawn(move || patrol.run(&token))
    }

    /// Drain escalation outcomes that have not been reported by a tick yet.
    #[must_use]
    pub fn take_finished(&self) -> Vec<FinishedEscalation> {
        std::mem::take(&mut lock_state(&self.state).finished)
    }

    /// Block until every escalation started so far has finished.
    pub fn join_escalations(&self) {
        let threads = std::mem::take(&mut lock_state(&self.state).threads);
        for handle in threads {
            if handle.join().is_err() {
                warn!("escalation thread panicked");
            }
        }
    }

    /// Join escalation threads that have already exited, keeping the rest.
    fn reap_escalations(&self) {
        let done = {
            let mut state = lock_state(&self.state);
            let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut state.threads)
                .into_iter()
                .partition(|handle| handle.is_finished());
            state.threads = running;
            done
        };
        for handle in done {
            if handle.join().is_err() {
                warn!("escalation thread panicked");
            }
        }
    }

    fn start_escalation(&self, token: &CancelToken, record: WorkerRecord) -> io::Result<()> {
        let engine = Arc::clone(&self.engine);
        let registry = Arc::clone(&self.registry);
        let spawner = Arc::clone(&self.spawner);
        let workers = Arc::clone(&self.workers);
        let state = Arc::clone(&self.state);
        let token = token.clone();

        let handle = thread::Builder::new()
            .name(format!("warden-nudge-{}", record.id))
            .spawn(move || {
                let outcome = escalate(&engine, &registry, spawner.as_ref(), &workers, &token, &record);
                info!(worker = %record.id, ?outcome, "escalation finished");
                let mut state = lock_state(&state);
                state.in_flight.remove(&record.id);
                state.finished.push(FinishedEscalation {
                    worker: record.id,
                    outcome,
                });
            })?;

        lock_state(&self.state).threads.push(handle);
        Ok(())
    }
}

fn escalate(
    engine: &NudgeEngine,
    registry: &Registry,
    spawner: &dyn Spawner,
    workers: &[WorkerSpec],
    token: &CancelToken,
    record: &WorkerRecord,
) -> EscalationOutcome {
    let mailbox = record.mailbox();
    match engine.nudge_escalating(token, mailbox) {
        Ok(NudgeLevel::Restart) => respawn(engine, registry, spawner, workers, record),
        Ok(level) => EscalationOutcome::Recovered { level },
        Err(crate::Error::Cancelled) => EscalationOutcome::Cancelled,
        Err(err) => EscalationOutcome::Failed {
            error: err.to_string(),
        },
    }
}

fn respawn(
    engine: &NudgeEngine,
    registry: &Registry,
    spawner: &dyn Spawner,
    workers: &[WorkerSpec],
    record: &WorkerRecord,
) -> EscalationOutcome {
    let command = workers
        .iter()
        .find(|spec| spec.name == record.mailbox())
        .and_then(WorkerCommand::from_spec);
    let Some(command) = command else {
        info!(worker = %record.id, "no command configured; worker stays down");
        return EscalationOutcome::Terminated;
    };

    match spawner.spawn_with_resume(&command, &record.id) {
        Ok(handle) => {
            engine.register(record.mailbox(), Some(handle));
            if let Err(err) = registry.heartbeat(&record.id, WorkerStatus::Idle, &record.task) {
                debug!(worker = %record.id, error = %err, "respawned worker no longer registered");
            }
            info!(worker = %record.id, "worker respawned with resume");
            EscalationOutcome::Respawned
        }
        Err(err) => {
            warn!(worker = %record.id, error = %err, "respawn failed");
            EscalationOutcome::Terminated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NudgeConfig;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Handle {
        healthy: bool,
        killed: Arc<AtomicBool>,
    }

    impl WorkerHandle for Handle {
        fn write_input(&mut self, _bytes: &[u8]) -> io::Result<()> {
            if self.healthy {
                Ok(())
            } else {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
        }

        fn kill(&mut self) -> io::Result<()> {
            self.killed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSpawner {
        resumed: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl Spawner for RecordingSpawner {
        fn spawn(&self, _command: &WorkerCommand) -> io::Result<Box<dyn WorkerHandle>> {
            Ok(Box::new(Handle {
                healthy: true,
                killed: Arc::default(),
            }))
        }

        fn spawn_with_resume(
            &self,
            command: &WorkerCommand,
            prior_session: &str,
        ) -> io::Result<Box<dyn WorkerHandle>> {
            self.resumed
                .lock()
                .unwrap()
                .push((prior_session.to_string(), command.resumed_args(prior_session)));
            self.spawn(command)
        }
    }

    fn config(stale_after_secs: u64, delay_secs: u64) -> ProjectConfig {
        ProjectConfig {
            patrol: PatrolConfig {
                interval_secs: 1,
                stale_after_secs,
            },
            nudge: NudgeConfig {
                escalation_delay_secs: delay_secs,
                ..NudgeConfig::default()
            },
            ..ProjectConfig::default()
        }
    }

    fn broken_handle() -> (Box<dyn WorkerHandle>, Arc<AtomicBool>) {
        let killed = Arc::new(AtomicBool::new(false));
        let handle = Box::new(Handle {
            healthy: false,
            killed: Arc::clone(&killed),
        });
        (handle, killed)
    }

    fn settle() {
        thread::sleep(Duration::from_millis(5));
    }

    #[test]
    fn fresh_workers_are_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let patrol = Patrol::new(dir.path(), &config(300, 0), Arc::new(RecordingSpawner::default()));
        patrol
            .register_worker("w-1", "sal", WorkerKind::Persistent, None)
            .unwrap();

        let report = patrol.tick(&CancelToken::new());
        assert_eq!(report.checked, 1);
        assert!(report.stale.is_empty());
        assert!(patrol.last_checked("w-1").is_some());
    }

    #[test]
    fn stale_heartbeat_file_triggers_mailbox_nudge() {
        let dir = tempfile::tempdir().expect("tempdir");
        let patrol = Patrol::new(dir.path(), &config(300, 0), Arc::new(RecordingSpawner::default()));

        let mut record = WorkerRecord::new("w-1", "sal", WorkerKind::Persistent);
        record.last_ping = Utc::now() - chrono::Duration::minutes(30);
        HeartbeatDir::new(dir.path()).publish(&record).unwrap();

        let token = CancelToken::new();
        let report = patrol.tick(&token);
        assert_eq!(report.ingested, 1);
        assert_eq!(report.stale, ["w-1"]);
        assert_eq!(report.escalated, ["w-1"]);
        assert_eq!(
            patrol.registry().get("w-1").unwrap().status,
            WorkerStatus::Stuck
        );

        patrol.join_escalations();
        assert!(patrol.engine().hooks().read("sal").unwrap().is_some());

        let next = patrol.tick(&token);
        assert_eq!(
            next.finished,
            [FinishedEscalation {
                worker: "w-1".into(),
                outcome: EscalationOutcome::Recovered {
                    level: NudgeLevel::Mailbox
                },
            }]
        );
    }

    #[test]
    fn restart_respawns_configured_worker_with_resume() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_dir = dir.path().join("state-file");
        std::fs::write(&state_dir, "blocks hook writes").unwrap();

        let mut cfg = config(0, 0);
        cfg.workers.push(WorkerSpec {
            name: "sal".into(),
            kind: WorkerKind::Persistent,
            command: vec!["agent".into()],
            resume_args: vec!["--resume".into(), "{session}".into()],
        });
        let spawner = Arc::new(RecordingSpawner::default());
        let patrol = Patrol::new(&state_dir, &cfg, spawner.clone());

        let (handle, killed) = broken_handle();
        patrol
            .register_worker("w-1", "sal", WorkerKind::Persistent, Some(handle))
            .unwrap();
        settle();

        let token = CancelToken::new();
        patrol.tick(&token);
        patrol.join_escalations();

        assert!(killed.load(Ordering::SeqCst));
        assert!(patrol.engine().has_handle("sal"));
        let resumed = spawner.resumed.lock().unwrap().clone();
        assert_eq!(
            resumed,
            [("w-1".to_string(), vec!["--resume".to_string(), "w-1".to_string()])]
        );

        let next = patrol.tick(&token);
        assert_eq!(next.finished[0].outcome, EscalationOutcome::Respawned);
        assert!(next.removed.is_empty());
    }

    #[test]
    fn killed_worker_without_command_is_deregistered_next_tick() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_dir = dir.path().join("state-file");
        std::fs::write(&state_dir, "blocks hook writes").unwrap();
        let patrol = Patrol::new(&state_dir, &config(0, 0), Arc::new(RecordingSpawner::default()));

        let (handle, _killed) = broken_handle();
        patrol
            .register_worker("w-1", "", WorkerKind::Ephemeral, Some(handle))
            .unwrap();
        settle();

        let token = CancelToken::new();
        patrol.tick(&token);
        patrol.join_escalations();

        let next = patrol.tick(&token);
        assert_eq!(next.finished[0].outcome, EscalationOutcome::Terminated);
        assert_eq!(next.removed, ["w-1"]);
        assert!(patrol.registry().get("w-1").is_none());
    }

    #[test]
    fn running_escalation_is_not_duplicated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let patrol = Patrol::new(dir.path(), &config(0, 60), Arc::new(RecordingSpawner::default()));
        let (handle, _killed) = broken_handle();
        patrol
            .register_worker("w-1", "sal", WorkerKind::Persistent, Some(handle))
            .unwrap();
        settle();

        let token = CancelToken::new();
        assert_eq!(patrol.tick(&token).escalated, ["w-1"]);
        let second = patrol.tick(&token);
        assert!(second.escalated.is_empty());
        assert_eq!(second.in_flight, ["w-1"]);

        token.cancel();
        patrol.join_escalations();
        let after = patrol.tick(&token);
        assert_eq!(after.finished[0].outcome, EscalationOutcome::Cancelled);
        patrol.join_escalations();
    }

    #[test]
    fn repeated_escalations_do_not_accumulate_threads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let patrol = Patrol::new(dir.path(), &config(0, 0), Arc::new(RecordingSpawner::default()));
        patrol
            .register_worker("w-1", "sal", WorkerKind::Persistent, None)
            .unwrap();
        settle();

        let token = CancelToken::new();
        for _ in 0..50 {
            patrol.tick(&token);
            settle();
            assert!(lock_state(&patrol.state).threads.len() <= 2);
        }
        patrol.join_escalations();
        patrol.tick(&token);
        assert!(lock_state(&patrol.state).threads.len() <= 1);
        patrol.join_escalations();
    }

    #[test]
    fn launch_configured_starts_persistent_workers_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = config(300, 0);
        for (name, kind) in [("sal", WorkerKind::Persistent), ("temp", WorkerKind::Ephemeral)] {
            cfg.workers.push(WorkerSpec {
                name: name.into(),
                kind,
                command: vec!["agent".into()],
                resume_args: Vec::new(),
            });
        }
        let patrol = Patrol::new(dir.path(), &cfg, Arc::new(RecordingSpawner::default()));

        assert_eq!(patrol.launch_configured(), 1);
        assert!(patrol.engine().has_handle("sal"));
        assert!(patrol.registry().get("temp").is_none());
    }

    #[test]
    fn run_stops_when_cancelled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let patrol = Arc::new(Patrol::new(
            dir.path(),
            &config(300, 0),
            Arc::new(RecordingSpawner::default()),
        ));
        let token = CancelToken::new();
        let handle = patrol.spawn(token.clone()).unwrap();
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn run_stops_launched_workers_on_shutdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let patrol = Arc::new(Patrol::new(
            dir.path(),
            &config(300, 0),
            Arc::new(RecordingSpawner::default()),
        ));
        let (handle, killed) = broken_handle();
        patrol
            .register_worker("w-1", "sal", WorkerKind::Persistent, Some(handle))
            .unwrap();

        let token = CancelToken::new();
        let runner = patrol.spawn(token.clone()).unwrap();
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        runner.join().unwrap();

        assert!(killed.load(Ordering::SeqCst));
        assert!(!patrol.engine().has_handle("sal"));
    }

    #[test]
    fn heartbeat_facade_updates_registry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let patrol = Patrol::new(dir.path(), &config(300, 0), Arc::new(RecordingSpawner::default()));
        patrol
            .register_worker("w-1", "sal", WorkerKind::Persistent, None)
            .unwrap();
        let record = patrol
            .heartbeat("w-1", WorkerStatus::Active, "wd-a1b2")
            .unwrap();
        assert_eq!(record.task, "wd-a1b2");
        assert!(patrol.heartbeat("ghost", WorkerStatus::Idle, "").is_err());
        patrol.deregister_worker("w-1").unwrap();
        assert!(patrol.registry().is_empty());
    }
}
