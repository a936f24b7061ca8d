//! `wd update`: change fields of an existing item.

use std::path::Path;

use clap::Args;
use warden_core::model::{ItemType, Status, WorkItem};

use super::{Project, require_actor};
use crate::output::{OutputMode, render};

#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Item ID to update.
    pub id: String,

    #[arg(short, long)]
    pub title: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    /// New status: open, in_progress, blocked, pending_approval, closed.
    #[arg(short, long)]
    pub status: Option<Status>,

    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=4))]
    pub priority: Option<u8>,

    /// New assignee. Pass an empty string to unassign.
    #[arg(short, long)]
    pub assignee: Option<String>,

    #[arg(long = "type")]
    pub item_type: Option<ItemType>,

    #[arg(long)]
    pub turf: Option<String>,

    #[arg(long)]
    pub parent: Option<String>,
}

impl UpdateArgs {
    fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.status.is_some()
            || self.priority.is_some()
            || self.assignee.is_some()
            || self.item_type.is_some()
            || self.turf.is_some()
            || self.parent.is_some()
    }

    /// Copy every provided field onto `item`.
    fn apply(&self, item: &mut WorkItem) {
        if let Some(title) = &self.title {
            item.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            item.description.clone_from(description);
        }
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(priority) = self.priority {
            item.priority = priority;
        }
        if let Some(assignee) = &self.assignee {
            item.assignee = assignee.trim().to_string();
        }
        if let Some(item_type) = self.item_type {
            item.item_type = item_type;
        }
        if let Some(turf) = &self.turf {
            item.turf = turf.trim().to_string();
        }
        if let Some(parent) = &self.parent {
            item.parent_id = Some(parent.clone()).filter(|p| !p.is_empty());
        }
    }
}

/// Execute `wd update`.
///
/// # Errors
///
/// Missing actor, no fields given, unknown id, or validation failure.
pub fn run_update(
    args: &UpdateArgs,
    actor_flag: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    if !args.has_changes() {
        anyhow::bail!("nothing to update: pass at least one field flag");
    }
    let actor = require_actor(actor_flag)?;
    let project = Project::discover(project_root)?;
    let store = project.store();

    let mut item = store.get(&args.id)?;
    if let Some(parent) = args.parent.as_deref().filter(|p| !p.is_empty()) {
        store.get(parent)?;
    }
    args.apply(&mut item);
    let updated = store.update(item, &actor)?;

    render(output, &updated, |item, w| {
        writeln!(w, "✓ Updated {} ({}, P{})", item.id, item.status, item.priority)
    })
}
