//! `wd dep`: manage and inspect blocking links between work items.
//!
//! Subcommands:
//! - `wd dep add <blocker> --blocks <target>`: add an edge
//! - `wd dep rm <blocker> <target>`: remove an edge
//! - `wd dep blockers <id>` / `wd dep blocking <id>`: direct neighbours
//! - `wd dep tree <id>`: transitive closure in both directions

use std::io::{self, Write};
use std::path::Path;

use clap::{Args, Subcommand};
use serde::Serialize;
use warden_core::graph::{CycleWarning, DependencyNode, DependencyTree};

use super::Project;
use crate::output::{OutputMode, pretty_section, render, render_mode};

// ---------------------------------------------------------------------------
// Clap types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct DepArgs {
    #[command(subcommand)]
    pub command: DepCommand,
}

#[derive(Subcommand, Debug)]
pub enum DepCommand {
    #[command(
        about = "Add a blocking link between two items",
        after_help = "EXAMPLES:\n    # wd-aaaa blocks wd-bbbb\n    wd dep add wd-aaaa --blocks wd-bbbb"
    )]
    Add(DepAddArgs),

    #[command(
        about = "Remove a blocking link",
        after_help = "EXAMPLES:\n    # Remove the link: wd-aaaa blocks wd-bbbb\n    wd dep rm wd-aaaa wd-bbbb"
    )]
    Rm(DepRmArgs),

    /// Items that directly block <id>.
    Blockers(DepIdArgs),

    /// Items <id> directly blocks.
    Blocking(DepIdArgs),

    /// Full dependency tree around <id>.
    Tree(DepIdArgs),
}

#[derive(Args, Debug)]
pub struct DepAddArgs {
    /// The blocker.
    pub blocker: String,

    /// The item that must wait for the blocker to close.
    #[arg(long, value_name = "TARGET")]
    pub blocks: String,
}

#[derive(Args, Debug)]
pub struct DepRmArgs {
    pub blocker: String,
    pub target: String,
}

#[derive(Args, Debug)]
pub struct DepIdArgs {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct DepChangeOutput {
    ok: bool,
    blocker: String,
    target: String,
    changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    cycle: Option<CycleWarning>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Execute `wd dep <subcommand>`.
///
/// # Errors
///
/// Unknown ids, self edges, or storage failure.
pub fn run_dep(args: &DepArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let project = Project::discover(project_root)?;
    let store = project.store();

    match &args.command {
        DepCommand::Add(add) => {
            let cycle = store.add_dependency(&add.blocker, &add.blocks)?;
            let result = DepChangeOutput {
                ok: true,
                blocker: add.blocker.clone(),
                target: add.blocks.clone(),
                changed: true,
                cycle,
            };
            render(output, &result, |r, w| {
                writeln!(w, "✓ {} now blocks {}", r.blocker, r.target)?;
                if let Some(cycle) = &r.cycle {
                    writeln!(w, "  warning: {cycle}")?;
                }
                Ok(())
            })
        }
        DepCommand::Rm(rm) => {
            let removed = store.remove_dependency(&rm.blocker, &rm.target)?;
            let result = DepChangeOutput {
                ok: true,
                blocker: rm.blocker.clone(),
                target: rm.target.clone(),
                changed: removed,
                cycle: None,
            };
            render(output, &result, |r, w| {
                if r.changed {
                    writeln!(w, "✓ {} no longer blocks {}", r.blocker, r.target)
                } else {
                    writeln!(w, "{} did not block {}", r.blocker, r.target)
                }
            })
        }
        DepCommand::Blockers(target) => {
            let items = store.blocked_by(&target.id)?;
            super::list::render_items(output, &format!("Blockers of {}", target.id), &items)
        }
        DepCommand::Blocking(target) => {
            let items = store.blocking(&target.id)?;
            super::list::render_items(output, &format!("Blocked by {}", target.id), &items)
        }
        DepCommand::Tree(target) => {
            let tree = store.dependency_tree(&target.id)?;
            render_mode(output, &tree, render_tree, |tree, w| {
                pretty_section(w, &format!("Dependencies of {}", tree.root.id))?;
                render_tree(tree, w)
            })
        }
    }
}

fn write_nodes(w: &mut dyn Write, nodes: &[DependencyNode], depth: usize) -> io::Result<()> {
    for node in nodes {
        let marker = if node.truncated { " (seen)" } else { "" };
        writeln!(
            w,
            "{:indent$}- {}  {}  P{}  {}{marker}",
            "",
            node.item.id,
            node.item.status,
            node.item.priority,
            node.item.title,
            indent = depth * 2
        )?;
        write_nodes(w, &node.children, depth + 1)?;
    }
    Ok(())
}

fn render_tree(tree: &DependencyTree, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{}  {}  P{}  {}",
        tree.root.id, tree.root.status, tree.root.priority, tree.root.title
    )?;
    writeln!(w, "blocked by:")?;
    if tree.blocked_by.is_empty() {
        writeln!(w, "  (none)")?;
    }
    write_nodes(w, &tree.blocked_by, 1)?;
    writeln!(w, "blocks:")?;
    if tree.blocks.is_empty() {
        writeln!(w, "  (none)")?;
    }
    write_nodes(w, &tree.blocks, 1)?;
    for edge in &tree.cycles {
        writeln!(w, "warning: cycle through {} -> {}", edge.from, edge.to)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::graph::NodeSummary;
    use warden_core::model::Status;

    fn node(id: &str, children: Vec<DependencyNode>) -> DependencyNode {
        DependencyNode {
            item: NodeSummary {
                id: id.into(),
                title: format!("item {id}"),
                status: Status::Open,
                priority: 2,
            },
            truncated: false,
            children,
        }
    }

    #[test]
    fn tree_renders_nested_and_marks_empty_sides() {
        let tree = DependencyTree {
            root: node("wd-root", Vec::new()).item,
            blocked_by: vec![node("wd-a", vec![node("wd-b", Vec::new())])],
            blocks: Vec::new(),
            cycles: Vec::new(),
        };
        let mut buf = Vec::new();
        render_tree(&tree, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\n  - wd-a  open  P2  item wd-a\n"));
        assert!(text.contains("\n    - wd-b  open  P2  item wd-b\n"));
        assert!(text.ends_with("blocks:\n  (none)\n"));
    }

    #[test]
    fn truncated_nodes_are_marked() {
        let mut seen = node("wd-a", Vec::new());
        seen.truncated = true;
        let mut buf = Vec::new();
        write_nodes(&mut buf, &[seen], 0).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "- wd-a  open  P2  item wd-a (seen)\n");
    }
}
