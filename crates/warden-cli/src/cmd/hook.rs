//! `wd hook`: read and write per-worker mailboxes.

use std::io::{self, Write};
use std::path::Path;

use clap::{Args, Subcommand};
use serde::Serialize;
use warden_core::hook::HookMessage;
use warden_core::nudge::NudgeEngine;

use super::{Project, require_actor};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct HookArgs {
    #[command(subcommand)]
    pub command: HookCommand,
}

#[derive(Subcommand, Debug)]
pub enum HookCommand {
    /// Print the pending message without consuming it.
    Show(HookWorkerArgs),

    /// Print and remove the pending message.
    Take(HookWorkerArgs),

    /// Remove the pending message.
    Clear(HookWorkerArgs),

    #[command(
        about = "Assign an item to a worker through its mailbox",
        after_help = "EXAMPLES:\n    # Hand wd-a1b2 to sal\n    wd hook assign sal wd-a1b2 --message \"start with the flaky test\""
    )]
    Assign(HookAssignArgs),
}

#[derive(Args, Debug)]
pub struct HookWorkerArgs {
    /// Worker name (mailbox).
    pub worker: String,
}

#[derive(Args, Debug)]
pub struct HookAssignArgs {
    pub worker: String,
    pub item: String,

    /// Note delivered with the assignment. Defaults to the item title.
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct HookOutput {
    worker: String,
    hook: Option<HookMessage>,
}

fn write_hook(out: &HookOutput, w: &mut dyn Write) -> io::Result<()> {
    match &out.hook {
        None => writeln!(w, "{}: (empty)", out.worker),
        Some(hook) => {
            let item = hook.bead_id.as_deref().unwrap_or("-");
            writeln!(
                w,
                "{}: {} {} {} {}",
                out.worker,
                hook.kind,
                item,
                hook.timestamp.format("%Y-%m-%d %H:%M:%S"),
                hook.message
            )
        }
    }
}

/// Execute `wd hook <subcommand>`.
///
/// # Errors
///
/// Uninitialized project, unknown item for `assign`, missing actor for
/// `assign`, or storage failure.
pub fn run_hook(
    args: &HookArgs,
    actor_flag: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let project = Project::discover(project_root)?;
    let hooks = project.hooks();

    match &args.command {
        HookCommand::Show(target) => {
            let result = HookOutput {
                worker: target.worker.clone(),
                hook: hooks.read(&target.worker)?,
            };
            render(output, &result, write_hook)
        }
        HookCommand::Take(target) => {
            let result = HookOutput {
                worker: target.worker.clone(),
                hook: hooks.take(&target.worker)?,
            };
            render(output, &result, write_hook)
        }
        HookCommand::Clear(target) => {
            let cleared = hooks.clear(&target.worker)?;
            let result = serde_json::json!({ "ok": true, "worker": target.worker, "cleared": cleared });
            render(output, &result, |_, w| {
                if cleared {
                    writeln!(w, "✓ Cleared hook for {}", target.worker)
                } else {
                    writeln!(w, "{}: (empty)", target.worker)
                }
            })
        }
        HookCommand::Assign(assign) => {
            let actor = require_actor(actor_flag)?;
            let store = project.store();
            let mut item = store.get(&assign.item)?;
            if item.assignee != assign.worker {
                item.assignee.clone_from(&assign.worker);
                item = store.update(item, &actor)?;
            }

            let message = assign.message.clone().unwrap_or_else(|| item.title.clone());
            let engine = NudgeEngine::new(hooks, project.config.nudge.clone());
            engine.assign(&assign.worker, &item.id, &message)?;

            let result = HookOutput {
                worker: assign.worker.clone(),
                hook: engine.hooks().read(&assign.worker)?,
            };
            render(output, &result, |r, w| {
                writeln!(w, "✓ Assigned {} to {}", item.id, r.worker)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mailbox_renders_placeholder() {
        let mut buf = Vec::new();
        write_hook(
            &HookOutput {
                worker: "sal".into(),
                hook: None,
            },
            &mut buf,
        )
        .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "sal: (empty)\n");
    }

    #[test]
    fn assign_renders_item_and_message() {
        let mut buf = Vec::new();
        write_hook(
            &HookOutput {
                worker: "sal".into(),
                hook: Some(HookMessage::assign("wd-a1b2", "go")),
            },
            &mut buf,
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("sal: assign wd-a1b2 "));
        assert!(text.ends_with(" go\n"));
    }
}
