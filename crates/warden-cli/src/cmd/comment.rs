//! `wd comment`: append a comment to an item's history.

use std::path::Path;

use clap::Args;

use super::{Project, require_actor};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Item ID to comment on.
    pub id: String,

    /// Comment text.
    pub text: String,
}

/// Execute `wd comment`.
///
/// # Errors
///
/// Missing actor, empty text, unknown id, or storage failure.
pub fn run_comment(
    args: &CommentArgs,
    actor_flag: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let actor = require_actor(actor_flag)?;
    let project = Project::discover(project_root)?;
    let event = project.store().add_comment(&args.id, &actor, &args.text)?;

    render(output, &event, |event, w| {
        writeln!(w, "✓ Commented on {} ({})", args.id, event.id)
    })
}
