//! `wd create`: create a new work item.

use std::path::Path;

use clap::Args;
use warden_core::model::{ItemType, PRIORITY_DEFAULT, WorkItem};

use super::{Project, require_actor};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Title of the new item.
    #[arg(short, long)]
    pub title: String,

    /// Description text.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Priority from 0 (most urgent) to 4.
    #[arg(short, long, default_value_t = PRIORITY_DEFAULT, value_parser = clap::value_parser!(u8).range(0..=4))]
    pub priority: u8,

    /// Item type: task, bug, feature, epic, or chore.
    #[arg(long = "type", default_value = "task")]
    pub item_type: ItemType,

    /// Turf (workspace) the item belongs to. Defaults to the configured workspace.
    #[arg(long)]
    pub turf: Option<String>,

    /// Initial assignee.
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Labels to attach (repeatable).
    #[arg(short, long)]
    pub label: Vec<String>,

    /// Parent item ID.
    #[arg(long)]
    pub parent: Option<String>,

    /// Items this one blocks (repeatable).
    #[arg(long, value_name = "ID")]
    pub blocks: Vec<String>,
}

/// Build the item to persist. Blocking targets ride along on the item so the
/// store writes it with every edge at once.
fn build_item(args: &CreateArgs, actor: String) -> WorkItem {
    let mut item = WorkItem::new(args.title.trim()).with_priority(args.priority);
    item.item_type = args.item_type;
    item.description = args.description.clone().unwrap_or_default();
    item.turf = args.turf.clone().unwrap_or_default();
    item.assignee = args.assignee.clone().unwrap_or_default();
    item.labels.clone_from(&args.label);
    item.parent_id.clone_from(&args.parent);
    for target in &args.blocks {
        if !item.blocks.contains(target) {
            item.blocks.push(target.clone());
        }
    }
    item.created_by = Some(actor);
    item
}

/// Execute `wd create`.
///
/// # Errors
///
/// Missing actor, uninitialized project, unknown parent or blocked item,
/// validation or storage failures. Nothing is written on error.
pub fn run_create(
    args: &CreateArgs,
    actor_flag: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let actor = require_actor(actor_flag)?;
    let project = Project::discover(project_root)?;
    let store = project.store();

    if let Some(parent) = &args.parent {
        store.get(parent)?;
    }
    for target in &args.blocks {
        store.get(target)?;
    }

    let created = store.create(build_item(args, actor))?;
    render(output, &created, |item, w| {
        writeln!(w, "✓ Created {}: {}", item.id, item.title)
    })
}
