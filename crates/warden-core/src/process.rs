//! Worker process collaborator.
//!
//! The supervisor never runs worker logic itself. It needs three things from
//! a live worker: a way to write to its input stream, a way to read its
//! output, and a way to terminate it. [`WorkerHandle`] is that seam; the
//! [`Spawner`] produces handles, including respawns that continue a prior
//! session.

use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info};

use crate::config::WorkerSpec;

/// Placeholder in resume arguments replaced by the prior session reference.
pub const SESSION_PLACEHOLDER: &str = "{session}";

/// A live worker the supervisor can poke or terminate.
pub trait WorkerHandle: Send {
    /// Write raw bytes to the worker's input stream.
    ///
    /// # Errors
    ///
    /// Any I/O error from the underlying stream, or `BrokenPipe` once the
    /// stream is gone.
    fn write_input(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Terminate the worker and reap it.
    ///
    /// # Errors
    ///
    /// Any I/O error raised while signalling or waiting.
    fn kill(&mut self) -> io::Result<()>;

    /// Hand over the worker's output stream, once.
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        None
    }
}

/// What to run for a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Appended on respawn, with [`SESSION_PLACEHOLDER`] substituted.
    pub resume_args: Vec<String>,
}

impl WorkerCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            resume_args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn resume_arg(mut self, arg: impl Into<String>) -> Self {
        self.resume_args.push(arg.into());
        self
    }

    /// `None` when the worker entry has no command to run.
    #[must_use]
    pub fn from_spec(spec: &WorkerSpec) -> Option<Self> {
        let (program, args) = spec.command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            resume_args: spec.resume_args.clone(),
        })
    }

    /// Full argument list for a respawn continuing `prior_session`.
    #[must_use]
    pub fn resumed_args(&self, prior_session: &str) -> Vec<String> {
        self.args
            .iter()
            .cloned()
            .chain(
                self.resume_args
                    .iter()
                    .map(|arg| arg.replace(SESSION_PLACEHOLDER, prior_session)),
            )
            .collect()
    }
}

/// Starts worker processes.
pub trait Spawner: Send + Sync {
    /// Start a fresh worker.
    ///
    /// # Errors
    ///
    /// The I/O error raised while starting the process.
    fn spawn(&self, command: &WorkerCommand) -> io::Result<Box<dyn WorkerHandle>>;

    /// Start a worker that continues `prior_session`.
    ///
    /// # Errors
    ///
    /// The I/O error raised while starting the process.
    fn spawn_with_resume(
        &self,
        command: &WorkerCommand,
        prior_session: &str,
    ) -> io::Result<Box<dyn WorkerHandle>>;
}

/// [`Spawner`] backed by `std::process` with piped stdin and stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

impl ProcessSpawner {
    fn start(program: &str, args: &[String]) -> io::Result<Box<dyn WorkerHandle>> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take();
        info!(program, pid = child.id(), "worker process started");
        Ok(Box::new(ChildWorker { child, stdin }))
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(&self, command: &WorkerCommand) -> io::Result<Box<dyn WorkerHandle>> {
        Self::start(&command.program, &command.args)
    }

    fn spawn_with_resume(
        &self,
        command: &WorkerCommand,
        prior_session: &str,
    ) -> io::Result<Box<dyn WorkerHandle>> {
        debug!(program = %command.program, prior_session, "resuming worker");
        Self::start(&command.program, &command.resumed_args(prior_session))
    }
}

/// A spawned child process.
#[derive(Debug)]
pub struct ChildWorker {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl ChildWorker {
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl WorkerHandle for ChildWorker {
    fn write_input(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin closed"))?;
        stdin.write_all(bytes)?;
        stdin.flush()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.stdin = None;
        if self.child.try_wait()?.is_none() {
            self.child.kill()?;
        }
        let status = self.child.wait()?;
        info!(pid = self.child.id(), %status, "worker process terminated");
        Ok(())
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as Box<dyn Read + Send>)
    }
}
