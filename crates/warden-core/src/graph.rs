//! Blocking dependency graph built from a snapshot of work items.
//!
//! # Edge direction
//!
//! Each item's `blocks` list is the **forward** edge: if `A.blocks` contains
//! `B`, then `B` waits on `A`. `B` re-enters the ready set only once `A` is
//! closed. The reverse view (`blocked_by`) is derived here and never stored.
//!
//! # Cycles
//!
//! The store does not reject cyclic edges. [`dependency_tree`] truncates a
//! branch when it revisits a node and reports every edge that closes a loop
//! in [`DependencyTree::cycles`], and [`detect_cycle_on_add`] lets callers
//! warn before persisting an edge that would close one.

#![allow(clippy::module_name_repetitions)]

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::model::{Status, WorkItem};

/// Forward and reverse blocking edges over one item snapshot.
#[derive(Debug, Clone, Default)]
pub struct BlockingGraph<'a> {
    items: HashMap<&'a str, &'a WorkItem>,
    /// item id -> ids it blocks (forward edges, from every item).
    blocks: HashMap<&'a str, Vec<&'a str>>,
    /// item id -> ids that block it (reverse edges, from every item).
    blocked_by: HashMap<&'a str, Vec<&'a str>>,
    /// Targets of at least one non-closed blocker.
    held: HashSet<&'a str>,
}

impl<'a> BlockingGraph<'a> {
    /// Build the graph. O(N * L) for N items with L links on average.
    pub fn from_items(items: &'a [WorkItem]) -> Self {
        let mut graph = Self::default();

        for item in items {
            graph.items.entry(item.id.as_str()).or_insert(item);

            let mut seen = HashSet::new();
            for target in &item.blocks {
                let target = target.as_str();
                if !seen.insert(target) {
                    continue;
                }
                graph.blocks.entry(item.id.as_str()).or_default().push(target);
                graph
                    .blocked_by
                    .entry(target)
                    .or_default()
                    .push(item.id.as_str());
                if !item.status.is_closed() {
                    graph.held.insert(target);
                }
            }
        }

        graph
    }

    /// Look up an item in the snapshot.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&'a WorkItem> {
        self.items.get(id).copied()
    }

    /// True when some non-closed item lists `id` in its `blocks`.
    #[must_use]
    pub fn is_blocked(&self, id: &str) -> bool {
        self.held.contains(id)
    }

    /// Ids of every item whose `blocks` lists `id`, closed or not.
    #[must_use]
    pub fn blockers_of(&self, id: &str) -> &[&'a str] {
        self.blocked_by.get(id).map_or(&[], Vec::as_slice)
    }

    /// Ids that `id` blocks, deduplicated, in declaration order.
    #[must_use]
    pub fn targets_of(&self, id: &str) -> &[&'a str] {
        self.blocks.get(id).map_or(&[], Vec::as_slice)
    }

    /// Open items, optionally in one workspace, that nothing unclosed blocks.
    ///
    /// Sorted ascending by priority; ties keep snapshot order.
    #[must_use]
    pub fn ready(&self, items: &'a [WorkItem], workspace: Option<&str>) -> Vec<&'a WorkItem> {
        let mut ready: Vec<&WorkItem> = items
            .iter()
            .filter(|item| item.status == Status::Open)
            .filter(|item| workspace.is_none_or(|turf| item.turf == turf))
            .filter(|item| !self.is_blocked(&item.id))
            .collect();
        ready.sort_by_key(|item| item.priority);
        ready
    }
}

/// Compact view of an item inside a dependency tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub priority: u8,
}

impl From<&WorkItem> for NodeSummary {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            status: item.status,
            priority: item.priority,
        }
    }
}

/// One node of a dependency tree.
///
/// `truncated` marks a node that was already expanded elsewhere in the same
/// direction; its children are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyNode {
    #[serde(flatten)]
    pub item: NodeSummary,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DependencyNode>,
}

/// An edge that closes a loop, `from` blocks `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CycleEdge {
    pub from: String,
    pub to: String,
}

/// Both directions of the dependency closure around one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyTree {
    pub root: NodeSummary,
    /// Upstream: items that (transitively) block the root.
    pub blocked_by: Vec<DependencyNode>,
    /// Downstream: items the root (transitively) blocks.
    pub blocks: Vec<DependencyNode>,
    /// Edges that close a loop; each one truncated a branch.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<CycleEdge>,
}

impl DependencyTree {
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Upstream,
    Downstream,
}

struct Walk<'g, 'a> {
    graph: &'g BlockingGraph<'a>,
    direction: Direction,
    expanded: HashSet<&'a str>,
    path: Vec<&'a str>,
    cycles: Vec<CycleEdge>,
}

impl<'a> Walk<'_, 'a> {
    fn neighbours(&self, id: &str) -> &[&'a str] {
        match self.direction {
            Direction::Upstream => self.graph.blockers_of(id),
            Direction::Downstream => self.graph.targets_of(id),
        }
    }

    fn record_cycle(&mut self, current: &str, next: &str) {
        let edge = match self.direction {
            Direction::Upstream => CycleEdge {
                from: next.to_string(),
                to: current.to_string(),
            },
            Direction::Downstream => CycleEdge {
                from: current.to_string(),
                to: next.to_string(),
            },
        };
        if !self.cycles.contains(&edge) {
            tracing::warn!(from = %edge.from, to = %edge.to, "dependency cycle truncated");
            self.cycles.push(edge);
        }
    }

    fn children(&mut self, id: &'a str) -> Vec<DependencyNode> {
        self.path.push(id);
        let mut nodes = Vec::new();
        let neighbours = self.neighbours(id).to_vec();
        for next in neighbours {
            let Some(item) = self.graph.item(next) else {
                tracing::debug!(from = id, to = next, "skipping edge to unknown item");
                continue;
            };
            if self.path.contains(&next) {
                self.record_cycle(id, next);
                nodes.push(DependencyNode {
                    item: item.into(),
                    truncated: true,
                    children: Vec::new(),
                });
                continue;
            }
            if !self.expanded.insert(next) {
                nodes.push(DependencyNode {
                    item: item.into(),
                    truncated: true,
                    children: Vec::new(),
                });
                continue;
            }
            let children = self.children(next);
            nodes.push(DependencyNode {
                item: item.into(),
                truncated: false,
                children,
            });
        }
        self.path.pop();
        nodes
    }
}

/// Resolve both dependency directions around `root`.
///
/// Each node is expanded at most once per direction, so the walk is
/// O(V + E) even on cyclic or diamond-shaped graphs.
#[must_use]
pub fn dependency_tree(graph: &BlockingGraph<'_>, root: &WorkItem) -> DependencyTree {
    let Some(root_id) = graph.item(&root.id).map(|item| item.id.as_str()) else {
        return DependencyTree {
            root: root.into(),
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            cycles: Vec::new(),
        };
    };

    let mut cycles = Vec::new();
    let mut sides = [Direction::Upstream, Direction::Downstream].map(|direction| {
        let mut walk = Walk {
            graph,
            direction,
            expanded: HashSet::from([root_id]),
            path: Vec::new(),
            cycles: Vec::new(),
        };
        let nodes = walk.children(root_id);
        for edge in walk.cycles {
            if !cycles.contains(&edge) {
                cycles.push(edge);
            }
        }
        nodes
    });

    let blocks = std::mem::take(&mut sides[1]);
    let blocked_by = std::mem::take(&mut sides[0]);
    DependencyTree {
        root: root.into(),
        blocked_by,
        blocks,
        cycles,
    }
}

/// A warning that adding `from -> to` would close a loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleWarning {
    /// The loop, starting and ending at `from`.
    pub path: Vec<String>,
}

impl fmt::Display for CycleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency cycle: {}", self.path.join(" -> "))
    }
}

/// Check whether a new edge `from` blocks `to` would close a cycle.
///
/// DFS from `to` along forward edges looking for `from`.
#[must_use]
pub fn detect_cycle_on_add(graph: &BlockingGraph<'_>, from: &str, to: &str) -> Option<CycleWarning> {
    if from == to {
        return Some(CycleWarning {
            path: vec![from.to_string(), to.to_string()],
        });
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&str, Vec<&str>)> = vec![(to, vec![to])];

    while let Some((current, trail)) = stack.pop() {
        if current == from {
            let mut path = Vec::with_capacity(trail.len() + 1);
            path.push(from.to_string());
            path.extend(trail.iter().map(ToString::to_string));
            return Some(CycleWarning { path });
        }
        if !visited.insert(current) {
            continue;
        }
        for next in graph.targets_of(current) {
            if !visited.contains(next) {
                let mut next_trail = trail.clone();
                next_trail.push(next);
                stack.push((next, next_trail));
            }
        }
    }
    None
}
