//! `wd nudge`: nudge one worker from the command line.
//!
//! A one-shot `wd` process holds no worker processes, so wake and restart
//! fail with a no-handle error here; the mailbox level always works. The
//! patrol loop is what nudges workers it launched itself.

use std::path::Path;

use clap::Args;
use serde::Serialize;
use warden_core::cancel::CancelToken;
use warden_core::nudge::{NudgeEngine, NudgeEvent, NudgeLevel};

use super::Project;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct NudgeArgs {
    /// Worker name (mailbox).
    pub worker: String,

    /// Single level: 0/wake, 1/mailbox, 2/restart. Defaults to mailbox.
    #[arg(short, long, conflicts_with = "escalate")]
    pub level: Option<NudgeLevel>,

    /// Try each level in order, waiting the configured delay between them.
    #[arg(long)]
    pub escalate: bool,
}

#[derive(Debug, Serialize)]
struct NudgeOutput {
    worker: String,
    level: NudgeLevel,
    attempts: Vec<NudgeEvent>,
}

/// Execute `wd nudge`.
///
/// # Errors
///
/// Uninitialized project, or the failure of the requested level (or of
/// every level with `--escalate`).
pub fn run_nudge(args: &NudgeArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let project = Project::discover(project_root)?;
    let engine = NudgeEngine::new(project.hooks(), project.config.nudge.clone());
    engine.register(&args.worker, None);

    let level = if args.escalate {
        engine.nudge_escalating(&CancelToken::new(), &args.worker)?
    } else {
        let level = args.level.unwrap_or(NudgeLevel::Mailbox);
        engine.nudge(&args.worker, level)?;
        level
    };

    let result = NudgeOutput {
        worker: args.worker.clone(),
        level,
        attempts: engine.history(&args.worker),
    };
    render(output, &result, |r, w| {
        writeln!(w, "✓ Nudged {} ({}, level {})", r.worker, r.level, r.level.as_u8())
    })
}
