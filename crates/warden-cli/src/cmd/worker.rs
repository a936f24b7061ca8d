//! `wd worker`: report and inspect worker liveness through heartbeat files.

use std::path::Path;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use warden_core::model::{WorkerKind, WorkerRecord, WorkerStatus};

use super::Project;
use crate::output::{OutputMode, pretty_section, render, render_mode, render_success};

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[command(subcommand)]
    pub command: WorkerCommand,
}

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    #[command(
        about = "Publish a liveness report",
        after_help = "EXAMPLES:\n    # First report registers the worker\n    wd worker heartbeat w-1 --name sal --kind persistent\n\n    # Later reports only need what changed\n    wd worker heartbeat w-1 --status active --task wd-a1b2"
    )]
    Heartbeat(HeartbeatArgs),

    /// List workers known from heartbeat files.
    List,

    /// Forget a worker by removing its heartbeat file.
    Rm(WorkerIdArgs),
}

#[derive(Args, Debug)]
pub struct HeartbeatArgs {
    /// Worker id.
    pub id: String,

    /// Name used as the hook mailbox. Kept from the previous report when omitted.
    #[arg(long)]
    pub name: Option<String>,

    /// persistent or ephemeral. Kept from the previous report when omitted.
    #[arg(long)]
    pub kind: Option<WorkerKind>,

    #[arg(long, default_value = "idle")]
    pub status: WorkerStatus,

    /// Item currently being worked on.
    #[arg(long, default_value = "")]
    pub task: String,
}

#[derive(Args, Debug)]
pub struct WorkerIdArgs {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct WorkerRow {
    #[serde(flatten)]
    record: WorkerRecord,
    stale: bool,
}

/// Whether a worker last heard from at `last_ping` counts as stale at `now`.
fn is_stale(last_ping: DateTime<Utc>, now: DateTime<Utc>, stale_after_secs: u64) -> bool {
    let age = now.signed_duration_since(last_ping).num_seconds();
    age > i64::try_from(stale_after_secs).unwrap_or(i64::MAX)
}

/// Execute `wd worker <subcommand>`.
///
/// # Errors
///
/// Uninitialized project, unknown worker for `rm`, or storage failure.
pub fn run_worker(args: &WorkerArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let project = Project::discover(project_root)?;
    let heartbeats = project.heartbeats();

    match &args.command {
        WorkerCommand::Heartbeat(beat) => {
            let previous = heartbeats
                .collect()?
                .into_iter()
                .find(|record| record.id == beat.id);
            let mut record = previous.unwrap_or_else(|| WorkerRecord::new(&beat.id, "", WorkerKind::default()));
            if let Some(name) = &beat.name {
                record.name = name.trim().to_string();
            }
            if let Some(kind) = beat.kind {
                record.kind = kind;
            }
            record.status = beat.status;
            record.task.clone_from(&beat.task);
            record.last_ping = Utc::now();

            heartbeats.publish(&record)?;
            render(output, &record, |r, w| {
                writeln!(w, "✓ Heartbeat {} ({}, {})", r.id, r.mailbox(), r.status)
            })
        }
        WorkerCommand::List => {
            let now = Utc::now();
            let threshold = project.config.patrol.stale_after_secs;
            let rows: Vec<WorkerRow> = heartbeats
                .collect()?
                .into_iter()
                .map(|record| WorkerRow {
                    stale: is_stale(record.last_ping, now, threshold),
                    record,
                })
                .collect();

            let line = |row: &WorkerRow| {
                format!(
                    "{}  {}  {}  {}  {}{}",
                    row.record.id,
                    row.record.mailbox(),
                    row.record.kind,
                    row.record.status,
                    row.record.last_ping.format("%Y-%m-%d %H:%M:%S"),
                    if row.stale { "  STALE" } else { "" }
                )
            };
            render_mode(
                output,
                &rows,
                |rows, w| {
                    for row in rows {
                        writeln!(w, "{}", line(row))?;
                    }
                    Ok(())
                },
                |rows, w| {
                    pretty_section(w, &format!("Workers ({})", rows.len()))?;
                    if rows.is_empty() {
                        writeln!(w, "(none)")?;
                    }
                    for row in rows {
                        writeln!(w, "{}", line(row))?;
                        if !row.record.task.is_empty() {
                            writeln!(w, "    task: {}", row.record.task)?;
                        }
                    }
                    Ok(())
                },
            )
        }
        WorkerCommand::Rm(target) => {
            if !heartbeats.remove(&target.id)? {
                return Err(warden_core::Error::NotFound {
                    kind: "worker",
                    id: target.id.clone(),
                }
                .into());
            }
            render_success(output, &format!("Removed worker {}", target.id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn stale_is_strictly_older_than_threshold() {
        let now = Utc::now();
        assert!(!is_stale(now - Duration::seconds(300), now, 300));
        assert!(is_stale(now - Duration::seconds(301), now, 300));
        assert!(!is_stale(now, now, 0));
    }

    #[test]
    fn heartbeat_args_default_to_idle() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: HeartbeatArgs,
        }
        let w = Wrapper::parse_from(["test", "w-1"]);
        assert_eq!(w.args.status, WorkerStatus::Idle);
        assert!(w.args.name.is_none());
        assert!(w.args.task.is_empty());
    }
}
