//! `wd show`: display one work item with its history.

use std::io::{self, Write};
use std::path::Path;

use clap::Args;
use serde::Serialize;
use warden_core::model::{ItemEvent, WorkItem};

use super::Project;
use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Item ID to show.
    pub id: String,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    #[serde(flatten)]
    item: WorkItem,
    /// Open items currently holding this one back.
    blocked_by: Vec<String>,
}

/// Execute `wd show <id>`.
///
/// # Errors
///
/// Uninitialized project, unknown id, or storage failure.
pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let project = Project::discover(project_root)?;
    let store = project.store();

    let item = store.get(&args.id)?;
    let blocked_by = store
        .blocked_by(&item.id)?
        .into_iter()
        .filter(|blocker| !blocker.status.is_closed())
        .map(|blocker| blocker.id)
        .collect();

    let result = ShowOutput { item, blocked_by };
    render_mode(output, &result, render_text, render_pretty)
}

fn describe_event(event: &ItemEvent) -> String {
    let when = event
        .timestamp
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let mut line = format!("{when}  {}  {}", event.kind, event.actor);
    if event.from.is_some() || event.to.is_some() {
        line.push_str(&format!(
            "  {} -> {}",
            event.from.as_deref().unwrap_or(""),
            event.to.as_deref().unwrap_or("")
        ));
    }
    if let Some(comment) = &event.comment {
        line.push_str(&format!("  \"{comment}\""));
    }
    line
}

fn render_pretty(out: &ShowOutput, w: &mut dyn Write) -> io::Result<()> {
    let item = &out.item;
    pretty_section(w, &format!("Item {}", item.id))?;
    writeln!(w, "{}", item.title)?;
    pretty_rule(w)?;
    pretty_kv(w, "type", item.item_type.to_string())?;
    pretty_kv(w, "status", item.status.to_string())?;
    pretty_kv(w, "priority", format!("P{}", item.priority))?;
    pretty_kv(w, "turf", &item.turf)?;
    pretty_kv(w, "branch", &item.branch)?;
    if !item.assignee.is_empty() {
        pretty_kv(w, "assignee", &item.assignee)?;
    }
    if let Some(parent) = &item.parent_id {
        pretty_kv(w, "parent", parent)?;
    }
    if !item.labels.is_empty() {
        pretty_kv(w, "labels", item.labels.join(", "))?;
    }
    if !item.blocks.is_empty() {
        pretty_kv(w, "blocks", item.blocks.join(", "))?;
    }
    if !out.blocked_by.is_empty() {
        pretty_kv(w, "blocked_by", out.blocked_by.join(", "))?;
    }
    if let Some(reason) = &item.close_reason {
        pretty_kv(w, "reason", reason)?;
    }

    if !item.description.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Description")?;
        for line in item.description.lines() {
            writeln!(w, "{line}")?;
        }
    }

    writeln!(w)?;
    pretty_section(w, &format!("History ({})", item.history.len()))?;
    for event in &item.history {
        writeln!(w, "{}", describe_event(event))?;
    }
    Ok(())
}

fn render_text(out: &ShowOutput, w: &mut dyn Write) -> io::Result<()> {
    let item = &out.item;
    writeln!(w, "{}  {}", item.id, item.title)?;
    writeln!(
        w,
        "status={} priority={} type={} turf={} assignee={}",
        item.status, item.priority, item.item_type, item.turf, item.assignee
    )?;
    if !item.blocks.is_empty() {
        writeln!(w, "blocks={}", item.blocks.join(","))?;
    }
    if !out.blocked_by.is_empty() {
        writeln!(w, "blocked_by={}", out.blocked_by.join(","))?;
    }
    if !item.description.is_empty() {
        writeln!(w, "{}", item.description)?;
    }
    for event in &item.history {
        writeln!(w, "- {}", describe_event(event))?;
    }
    Ok(())
}
