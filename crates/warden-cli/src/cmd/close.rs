//! `wd close`: close a work item.

use std::path::Path;

use clap::Args;

use super::{Project, require_actor};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Item ID to close.
    pub id: String,

    /// Why the item was closed.
    #[arg(short, long)]
    pub reason: Option<String>,
}

/// Execute `wd close`.
///
/// # Errors
///
/// Missing actor, unknown id, or storage failure.
pub fn run_close(
    args: &CloseArgs,
    actor_flag: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let actor = require_actor(actor_flag)?;
    let project = Project::discover(project_root)?;
    let closed = project
        .store()
        .close(&args.id, &actor, args.reason.as_deref())?;

    render(output, &closed, |item, w| writeln!(w, "✓ Closed {}: {}", item.id, item.title))
}
