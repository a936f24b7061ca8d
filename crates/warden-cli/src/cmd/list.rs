//! `wd list`: list work items with filters.

use std::path::Path;

use clap::Args;
use warden_core::model::{ItemType, Status, WorkItem};
use warden_core::store::ItemFilter;

use super::{Project, item_row};
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only items in this status.
    #[arg(short, long)]
    pub status: Option<Status>,

    /// Only items in this turf.
    #[arg(long)]
    pub turf: Option<String>,

    /// Only items assigned to this worker.
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Only items of this type.
    #[arg(long = "type")]
    pub item_type: Option<ItemType>,

    /// Only children of this parent.
    #[arg(long)]
    pub parent: Option<String>,

    /// Filter expression, e.g. `status=open,turf=api`. Flags override it.
    #[arg(long)]
    pub filter: Option<String>,
}

impl ListArgs {
    /// Combine the filter expression with the individual flags.
    fn to_filter(&self) -> warden_core::Result<ItemFilter> {
        let mut filter = match &self.filter {
            Some(expr) => expr.parse()?,
            None => ItemFilter::default(),
        };
        if let Some(status) = self.status {
            filter = filter.with_status(status);
        }
        if let Some(turf) = &self.turf {
            filter = filter.with_workspace(turf);
        }
        if let Some(assignee) = &self.assignee {
            filter = filter.with_assignee(assignee);
        }
        if let Some(item_type) = self.item_type {
            filter = filter.with_type(item_type);
        }
        if let Some(parent) = &self.parent {
            filter = filter.with_parent(parent);
        }
        Ok(filter)
    }
}

/// Execute `wd list`.
///
/// # Errors
///
/// Uninitialized project, malformed filter, or storage failure.
pub fn run_list(args: &ListArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let project = Project::discover(project_root)?;
    let filter = args.to_filter()?;
    let items = project.store().list(&filter)?;
    render_items(output, "Items", &items)
}

/// Shared renderer for `list` and `ready`.
pub(crate) fn render_items(output: OutputMode, heading: &str, items: &[WorkItem]) -> anyhow::Result<()> {
    render_mode(
        output,
        &items,
        |items, w| {
            for item in *items {
                writeln!(w, "{}", item_row(item))?;
            }
            Ok(())
        },
        |items, w| {
            pretty_section(w, &format!("{heading} ({})", items.len()))?;
            if items.is_empty() {
                writeln!(w, "(none)")?;
            }
            for item in *items {
                writeln!(w, "{}", item_row(item))?;
                if !item.assignee.is_empty() {
                    writeln!(w, "    assignee: {}", item.assignee)?;
                }
            }
            Ok(())
        },
    )
}
