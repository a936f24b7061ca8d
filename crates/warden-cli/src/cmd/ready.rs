//! `wd ready`: list items that can be worked on now.

use std::path::Path;

use clap::Args;

use super::Project;
use super::list::render_items;
use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct ReadyArgs {
    /// Restrict to one turf.
    #[arg(long)]
    pub turf: Option<String>,
}

/// Execute `wd ready`.
///
/// # Errors
///
/// Uninitialized project or storage failure.
pub fn run_ready(args: &ReadyArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let project = Project::discover(project_root)?;
    let items = project.store().list_ready(args.turf.as_deref())?;
    render_items(output, "Ready", &items)
}
