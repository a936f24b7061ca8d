//! Persisted work-item store.
//!
//! # Storage layout
//!
//! ```text
//! <dir>/items.jsonl   one WorkItem JSON object per line
//! <dir>/items.lock    fs2 advisory lock, held by writers
//! ```
//!
//! # Discipline
//!
//! Every operation reads the whole file. Writers mutate the in-memory copy
//! and write everything back via temp-file + rename, so readers never observe
//! a partial file. One `RwLock` per store instance makes operations
//! linearizable within a process; the optional file lock extends writer
//! exclusion to other processes sharing the directory.
//!
//! Unparseable lines are skipped on read and carried through rewrites
//! verbatim.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::graph::{self, BlockingGraph, CycleWarning, DependencyTree};
use crate::lock::FileLock;
use crate::model::{EventKind, ItemEvent, ItemType, Status, WorkItem};

const ITEMS_FILE: &str = "items.jsonl";
const LOCK_FILE: &str = "items.lock";
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_MIN_LEN: usize = 4;
const ID_ATTEMPTS_PER_LEN: usize = 16;
const EVENT_ID_LEN: usize = 8;

/// Composable list filter; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub status: Option<Status>,
    pub workspace: Option<String>,
    pub assignee: Option<String>,
    pub item_type: Option<ItemType>,
    pub parent: Option<String>,
}

impl ItemFilter {
    #[must_use]
    pub const fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    #[must_use]
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    #[must_use]
    pub const fn with_type(mut self, item_type: ItemType) -> Self {
        self.item_type = Some(item_type);
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// True when `item` satisfies every populated field.
    #[must_use]
    pub fn matches(&self, item: &WorkItem) -> bool {
        self.status.is_none_or(|status| item.status == status)
            && self.workspace.as_ref().is_none_or(|turf| &item.turf == turf)
            && self
                .assignee
                .as_ref()
                .is_none_or(|assignee| &item.assignee == assignee)
            && self.item_type.is_none_or(|kind| item.item_type == kind)
            && self
                .parent
                .as_ref()
                .is_none_or(|parent| item.parent_id.as_ref() == Some(parent))
    }
}

/// Parses `key=value` pairs separated by commas, e.g.
/// `status=open,turf=api,assignee=sal`.
impl FromStr for ItemFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut filter = Self::default();
        for clause in s.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let Some((key, value)) = clause.split_once('=') else {
                return Err(Error::validation(
                    "filter",
                    format!("expected key=value, got '{clause}'"),
                ));
            };
            let value = value.trim();
            match key.trim() {
                "status" => filter.status = Some(value.parse()?),
                "turf" | "workspace" => filter.workspace = Some(value.to_string()),
                "assignee" => filter.assignee = Some(value.to_string()),
                "type" => filter.item_type = Some(value.parse()?),
                "parent" => filter.parent = Some(value.to_string()),
                other => {
                    return Err(Error::validation(
                        "filter",
                        format!("unknown key '{other}'"),
                    ));
                }
            }
        }
        Ok(filter)
    }
}

/// Parsed file contents: good records plus lines we could not read.
#[derive(Debug, Default)]
struct Snapshot {
    items: Vec<WorkItem>,
    unreadable: Vec<String>,
}

/// The work-item store rooted at one directory.
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    items_path: PathBuf,
    lock_path: PathBuf,
    config: StoreConfig,
    guard: RwLock<()>,
}

impl Store {
    /// Construct a store over `dir`. Nothing is touched on disk until the
    /// first write.
    #[must_use]
    pub fn open(dir: impl Into<PathBuf>, config: StoreConfig) -> Self {
        let dir = dir.into();
        Self {
            items_path: dir.join(ITEMS_FILE),
            lock_path: dir.join(LOCK_FILE),
            dir,
            config,
            guard: RwLock::new(()),
        }
    }

    /// Create the directory and an empty items file if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|err| Error::storage(&self.dir, err))?;
        if !self.items_path.exists() {
            write_atomic(&self.items_path, b"")?;
        }
        Ok(())
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn items_path(&self) -> &Path {
        &self.items_path
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Persist a new item and return it as stored.
    ///
    /// Assigns the id, timestamps, default workspace and branch, and appends
    /// a `created` event. The actor is `created_by` when set.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty title or bad priority,
    /// [`Error::Storage`] when the file cannot be read or written.
    pub fn create(&self, mut item: WorkItem) -> Result<WorkItem> {
        item.id.clear();
        item.validate()?;

        self.write(|snapshot| {
            let taken: HashSet<&str> = snapshot.items.iter().map(|i| i.id.as_str()).collect();
            let id = self.generate_id(&taken);
            let now = Utc::now();

            item.id = id;
            item.created_at = now;
            item.updated_at = now;
            item.closed_at = item.status.is_closed().then_some(now);
            if item.turf.trim().is_empty() {
                item.turf.clone_from(&self.config.default_workspace);
            }
            if item.branch.trim().is_empty() {
                item.branch = format!("{}/{}", self.config.branch_prefix, item.id);
            }

            let actor = item.created_by.clone().unwrap_or_default();
            for event in &mut item.history {
                stamp_event(event, now);
            }
            let mut created = ItemEvent::new(EventKind::Created, actor);
            stamp_event(&mut created, now);
            item.history.push(created);

            info!(id = %item.id, turf = %item.turf, priority = item.priority, "created work item");
            snapshot.items.push(item.clone());
            Ok(item)
        })
    }

    /// Replace the stored record with `item`'s id.
    ///
    /// A status change appends one `status_changed` event and an assignee
    /// change one `assigned` event, both attributed to `actor`. Stored events
    /// the caller's copy lacks are kept; events the caller added are appended
    /// in order. `id` and `created_at` cannot be changed.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id, [`Error::Validation`] for bad
    /// fields, [`Error::Storage`] on I/O failure.
    pub fn update(&self, item: WorkItem, actor: &str) -> Result<WorkItem> {
        item.validate()?;

        self.write(|snapshot| {
            let idx = position(&snapshot.items, &item.id)?;
            let stored = &snapshot.items[idx];
            let now = Utc::now();
            let mut next = item;

            next.created_at = stored.created_at;
            next.history = merge_history(&stored.history, next.history, now);

            if stored.status != next.status {
                let mut event = ItemEvent::new(EventKind::StatusChanged, actor)
                    .transition(stored.status.to_string(), next.status.to_string());
                stamp_event(&mut event, now);
                next.history.push(event);

                if next.status.is_closed() {
                    next.closed_at = Some(next.closed_at.unwrap_or(now));
                } else {
                    next.closed_at = None;
                }
                info!(id = %next.id, from = %stored.status, to = %next.status, "status changed");
            }

            if stored.assignee != next.assignee {
                let mut event = ItemEvent::new(EventKind::Assigned, actor)
                    .transition(stored.assignee.clone(), next.assignee.clone());
                stamp_event(&mut event, now);
                next.history.push(event);
                info!(id = %next.id, assignee = %next.assignee, "assignee changed");
            }

            next.updated_at = now;
            snapshot.items[idx] = next.clone();
            Ok(next)
        })
    }

    /// Close an item with an optional reason.
    ///
    /// # Errors
    ///
    /// Same as [`Store::update`].
    pub fn close(&self, id: &str, actor: &str, reason: Option<&str>) -> Result<WorkItem> {
        let mut item = self.get(id)?;
        item.status = Status::Closed;
        if let Some(reason) = reason {
            item.close_reason = Some(reason.to_string());
        }
        self.update(item, actor)
    }

    /// Append one audit event, stamping its id and timestamp when absent.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::Validation`], or [`Error::Storage`].
    pub fn add_event(&self, id: &str, event: ItemEvent) -> Result<ItemEvent> {
        let mut appended = self.add_events(id, vec![event])?;
        appended
            .pop()
            .ok_or_else(|| Error::validation("event", "nothing appended"))
    }

    /// Append a batch of events. The batch is all-or-nothing: the first
    /// invalid event aborts it and nothing is written.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::Validation`], or [`Error::Storage`].
    pub fn add_events(&self, id: &str, events: Vec<ItemEvent>) -> Result<Vec<ItemEvent>> {
        for event in &events {
            validate_event(event)?;
        }

        self.write(|snapshot| {
            let idx = position(&snapshot.items, id)?;
            let now = Utc::now();
            let item = &mut snapshot.items[idx];

            let mut appended = Vec::with_capacity(events.len());
            for mut event in events {
                stamp_event(&mut event, now);
                item.history.push(event.clone());
                appended.push(event);
            }
            item.updated_at = now;
            debug!(id, count = appended.len(), "appended events");
            Ok(appended)
        })
    }

    /// Append a `commented` event.
    ///
    /// # Errors
    ///
    /// Same as [`Store::add_event`].
    pub fn add_comment(&self, id: &str, actor: &str, text: &str) -> Result<ItemEvent> {
        self.add_event(
            id,
            ItemEvent::new(EventKind::Commented, actor).with_comment(text),
        )
    }

    /// Add the edge `blocker` blocks `target`.
    ///
    /// The edge is stored even when it closes a loop; the loop is returned as
    /// a warning for the caller to surface.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when either id is unknown, [`Error::Validation`]
    /// for a self edge, [`Error::Storage`] on I/O failure.
    pub fn add_dependency(&self, blocker: &str, target: &str) -> Result<Option<CycleWarning>> {
        if blocker == target {
            return Err(Error::validation("blocks", "an item cannot block itself"));
        }

        self.write(|snapshot| {
            position(&snapshot.items, target)?;
            let idx = position(&snapshot.items, blocker)?;

            let warning = {
                let graph = BlockingGraph::from_items(&snapshot.items);
                graph::detect_cycle_on_add(&graph, blocker, target)
            };
            if let Some(warning) = &warning {
                warn!(%warning, "dependency added despite cycle");
            }

            let item = &mut snapshot.items[idx];
            if !item.blocks.iter().any(|existing| existing == target) {
                item.blocks.push(target.to_string());
                item.updated_at = Utc::now();
                info!(blocker, target, "dependency added");
            }
            Ok(warning)
        })
    }

    /// Remove the edge `blocker` blocks `target`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown blocker, [`Error::Storage`] on I/O
    /// failure.
    pub fn remove_dependency(&self, blocker: &str, target: &str) -> Result<bool> {
        self.write(|snapshot| {
            let idx = position(&snapshot.items, blocker)?;
            let item = &mut snapshot.items[idx];
            let before = item.blocks.len();
            item.blocks.retain(|existing| existing != target);
            let removed = item.blocks.len() != before;
            if removed {
                item.updated_at = Utc::now();
                info!(blocker, target, "dependency removed");
            }
            Ok(removed)
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch one item.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::Storage`].
    pub fn get(&self, id: &str) -> Result<WorkItem> {
        self.read(|items| {
            items
                .iter()
                .find(|item| item.id == id)
                .cloned()
                .ok_or_else(|| Error::item_not_found(id))
        })
    }

    /// Items matching `filter`, in file order.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the file cannot be read.
    pub fn list(&self, filter: &ItemFilter) -> Result<Vec<WorkItem>> {
        self.read(|items| {
            Ok(items
                .iter()
                .filter(|item| filter.matches(item))
                .cloned()
                .collect())
        })
    }

    /// Open, unblocked items sorted by priority (0 first, ties in file order).
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the file cannot be read.
    pub fn list_ready(&self, workspace: Option<&str>) -> Result<Vec<WorkItem>> {
        self.read(|items| {
            let graph = BlockingGraph::from_items(items);
            let ready: Vec<WorkItem> = graph
                .ready(items, workspace)
                .into_iter()
                .cloned()
                .collect();
            debug!(count = ready.len(), workspace, "computed ready set");
            Ok(ready)
        })
    }

    /// Items whose `blocks` lists `id` (closed blockers included).
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::Storage`].
    pub fn blocked_by(&self, id: &str) -> Result<Vec<WorkItem>> {
        self.read(|items| {
            let graph = BlockingGraph::from_items(items);
            let _ = graph.item(id).ok_or_else(|| Error::item_not_found(id))?;
            Ok(resolve(&graph, graph.blockers_of(id)))
        })
    }

    /// Items listed in `id`'s `blocks`; dangling ids are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::Storage`].
    pub fn blocking(&self, id: &str) -> Result<Vec<WorkItem>> {
        self.read(|items| {
            let graph = BlockingGraph::from_items(items);
            let _ = graph.item(id).ok_or_else(|| Error::item_not_found(id))?;
            Ok(resolve(&graph, graph.targets_of(id)))
        })
    }

    /// Both directions of the dependency closure around `id`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::Storage`].
    pub fn dependency_tree(&self, id: &str) -> Result<DependencyTree> {
        self.read(|items| {
            let graph = BlockingGraph::from_items(items);
            let root = graph.item(id).ok_or_else(|| Error::item_not_found(id))?;
            Ok(graph::dependency_tree(&graph, root))
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn read<R>(&self, f: impl FnOnce(&[WorkItem]) -> Result<R>) -> Result<R> {
        let _shared = self.guard.read().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.load()?;
        f(&snapshot.items)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Snapshot) -> Result<R>) -> Result<R> {
        let _exclusive = self.guard.write().unwrap_or_else(PoisonError::into_inner);
        let _file_lock = if self.config.cross_process_lock {
            Some(FileLock::acquire(&self.lock_path, self.config.lock_timeout())?)
        } else {
            None
        };

        let mut snapshot = self.load()?;
        let result = f(&mut snapshot)?;
        self.save(&snapshot)?;
        Ok(result)
    }

    fn load(&self) -> Result<Snapshot> {
        let content = match std::fs::read_to_string(&self.items_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Snapshot::default());
            }
            Err(err) => return Err(Error::storage(&self.items_path, err)),
        };
        Ok(parse_lines(&content, &self.items_path))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut body = String::new();
        for item in &snapshot.items {
            let line = serde_json::to_string(item)
                .map_err(|err| Error::storage(&self.items_path, err.into()))?;
            body.push_str(&line);
            body.push('\n');
        }
        for line in &snapshot.unreadable {
            let _ = writeln!(body, "{line}");
        }
        write_atomic(&self.items_path, body.as_bytes())
    }

    fn generate_id(&self, taken: &HashSet<&str>) -> String {
        let mut rng = rand::thread_rng();
        let mut len = ID_MIN_LEN;
        loop {
            for _ in 0..ID_ATTEMPTS_PER_LEN {
                let candidate = format!("{}-{}", self.config.id_prefix, random_suffix(&mut rng, len));
                if !taken.contains(candidate.as_str()) {
                    return candidate;
                }
            }
            len += 1;
        }
    }
}

fn parse_lines(content: &str, path: &Path) -> Snapshot {
    let mut snapshot = Snapshot::default();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WorkItem>(line) {
            Ok(item) if !item.id.is_empty() => snapshot.items.push(item),
            Ok(_) => {
                warn!(path = %path.display(), line = line_no + 1, "skipping record without id");
                snapshot.unreadable.push(line.to_string());
            }
            Err(err) => {
                warn!(path = %path.display(), line = line_no + 1, error = %err, "skipping malformed record");
                snapshot.unreadable.push(line.to_string());
            }
        }
    }
    snapshot
}

fn position(items: &[WorkItem], id: &str) -> Result<usize> {
    items
        .iter()
        .position(|item| item.id == id)
        .ok_or_else(|| Error::item_not_found(id))
}

fn resolve(graph: &BlockingGraph<'_>, ids: &[&str]) -> Vec<WorkItem> {
    ids.iter()
        .filter_map(|id| graph.item(id))
        .cloned()
        .collect()
}

fn random_suffix(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect()
}

fn stamp_event(event: &mut ItemEvent, now: DateTime<Utc>) {
    if event.id.is_empty() {
        event.id = format!("ev-{}", random_suffix(&mut rand::thread_rng(), EVENT_ID_LEN));
    }
    if event.timestamp.is_none() {
        event.timestamp = Some(now);
    }
}

/// Stored history first, then caller events the store has not seen.
fn merge_history(stored: &[ItemEvent], incoming: Vec<ItemEvent>, now: DateTime<Utc>) -> Vec<ItemEvent> {
    let known: HashSet<&str> = stored.iter().map(|event| event.id.as_str()).collect();
    let mut merged = stored.to_vec();
    for mut event in incoming {
        if !event.id.is_empty() && known.contains(event.id.as_str()) {
            continue;
        }
        stamp_event(&mut event, now);
        merged.push(event);
    }
    merged
}

fn validate_event(event: &ItemEvent) -> Result<()> {
    match event.kind {
        EventKind::Commented if event.comment.as_deref().is_none_or(|c| c.trim().is_empty()) => {
            Err(Error::validation("comment", "must not be empty"))
        }
        EventKind::StatusChanged => {
            for value in [&event.from, &event.to].into_iter().flatten() {
                value.parse::<Status>()?;
            }
            if event.to.is_none() {
                return Err(Error::validation("event", "status_changed needs a 'to' status"));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join(".warden"), StoreConfig::default());
        (dir, store)
    }

    fn ids(items: &[WorkItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn create_assigns_id_and_defaults() {
        let (_dir, store) = store();
        let item = store.create(WorkItem::new("Wire hooks")).unwrap();

        assert!(item.id.starts_with("wd-"));
        assert_eq!(item.turf, "default");
        assert_eq!(item.branch, format!("work/{}", item.id));
        assert_eq!(item.history.len(), 1);
        assert_eq!(item.history[0].kind, EventKind::Created);
        assert!(!item.history[0].id.is_empty());
        assert_eq!(item.created_at, item.updated_at);
    }

    #[test]
    fn create_ignores_caller_supplied_id() {
        let (_dir, store) = store();
        let mut draft = WorkItem::new("x");
        draft.id = "wd-mine".into();
        let item = store.create(draft).unwrap();
        assert_ne!(item.id, "wd-mine");
    }

    #[test]
    fn create_rejects_invalid_items() {
        let (_dir, store) = store();
        assert!(matches!(
            store.create(WorkItem::new("")),
            Err(Error::Validation { field: "title", .. })
        ));
        assert!(matches!(
            store.create(WorkItem::new("x").with_priority(9)),
            Err(Error::Validation { field: "priority", .. })
        ));
        assert!(store.list(&ItemFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn get_round_trips_created_item() {
        let (_dir, store) = store();
        let mut draft = WorkItem::new("Round trip").with_priority(1).in_turf("api");
        draft.description = "body".into();
        draft.labels = vec!["a".into(), "b".into()];
        draft.assignee = "sal".into();
        draft.parent_id = Some("wd-parent".into());
        let created = store.create(draft).unwrap();

        assert_eq!(store.get(&created.id).unwrap(), created);
    }

    #[test]
    fn get_unknown_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.get("wd-nope"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn list_filters_are_anded() {
        let (_dir, store) = store();
        let mut a = WorkItem::new("a").in_turf("w");
        a.assignee = "sal".into();
        let a = store.create(a).unwrap();
        let _b = store.create(WorkItem::new("b").in_turf("w")).unwrap();
        let mut c = WorkItem::new("c").in_turf("x");
        c.assignee = "sal".into();
        let _c = store.create(c).unwrap();

        let filter = ItemFilter::default().with_workspace("w").with_assignee("sal");
        assert_eq!(ids(&store.list(&filter).unwrap()), [a.id.as_str()]);
        assert_eq!(store.list(&ItemFilter::default()).unwrap().len(), 3);
    }

    #[test]
    fn filter_parses_from_text() {
        let filter: ItemFilter = "status=in-progress, turf=api ,type=bug".parse().unwrap();
        assert_eq!(filter.status, Some(Status::InProgress));
        assert_eq!(filter.workspace.as_deref(), Some("api"));
        assert_eq!(filter.item_type, Some(ItemType::Bug));

        assert!(matches!(
            "status=finished".parse::<ItemFilter>(),
            Err(Error::Validation { .. })
        ));
        assert!("colour=red".parse::<ItemFilter>().is_err());
        assert!("status".parse::<ItemFilter>().is_err());
    }

    #[test]
    fn update_appends_exactly_one_status_event() {
        let (_dir, store) = store();
        let created = store.create(WorkItem::new("x")).unwrap();

        let mut next = created.clone();
        next.status = Status::InProgress;
        let updated = store.update(next, "sal").unwrap();

        let changes: Vec<_> = updated.events_of(EventKind::StatusChanged).collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from.as_deref(), Some("open"));
        assert_eq!(changes[0].to.as_deref(), Some("in_progress"));
        assert_eq!(changes[0].actor, "sal");
        assert_eq!(updated.history[0], created.history[0]);
    }

    #[test]
    fn update_without_status_change_adds_no_status_event() {
        let (_dir, store) = store();
        let created = store.create(WorkItem::new("x")).unwrap();
        let mut next = created.clone();
        next.title = "renamed".into();
        let updated = store.update(next, "op").unwrap();
        assert_eq!(updated.history.len(), 1);
        assert_eq!(updated.title, "renamed");
        assert!(updated.updated_at >= created.updated_at);
    }

    #[test]
    fn update_keeps_stored_events_missing_from_stale_copy() {
        let (_dir, store) = store();
        let created = store.create(WorkItem::new("x")).unwrap();
        let comment = store.add_comment(&created.id, "op", "first").unwrap();

        let mut stale = created.clone();
        stale.history.clear();
        stale.history.push(ItemEvent::new(EventKind::WorkStarted, "sal"));
        let updated = store.update(stale, "sal").unwrap();

        assert_eq!(updated.history.len(), 3);
        assert_eq!(updated.history[0], created.history[0]);
        assert_eq!(updated.history[1], comment);
        assert_eq!(updated.history[2].kind, EventKind::WorkStarted);
        assert!(updated.history[2].timestamp.is_some());
    }

    #[test]
    fn update_cannot_rewrite_existing_events() {
        let (_dir, store) = store();
        let created = store.create(WorkItem::new("x")).unwrap();
        let mut tampered = created.clone();
        tampered.history[0].actor = "mallory".into();
        let updated = store.update(tampered, "op").unwrap();
        assert_eq!(updated.history, created.history);
    }

    #[test]
    fn update_unknown_is_not_found() {
        let (_dir, store) = store();
        let mut ghost = WorkItem::new("ghost");
        ghost.id = "wd-ghost".into();
        assert!(matches!(store.update(ghost, "op"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn close_and_reopen_manage_closed_at() {
        let (_dir, store) = store();
        let created = store.create(WorkItem::new("x")).unwrap();
        let closed = store.close(&created.id, "op", Some("done")).unwrap();
        assert!(closed.closed_at.is_some());
        assert_eq!(closed.close_reason.as_deref(), Some("done"));

        let mut reopened = closed;
        reopened.status = Status::Open;
        let reopened = store.update(reopened, "op").unwrap();
        assert!(reopened.closed_at.is_none());
        assert_eq!(reopened.events_of(EventKind::StatusChanged).count(), 2);
    }

    #[test]
    fn assignee_change_is_audited() {
        let (_dir, store) = store();
        let created = store.create(WorkItem::new("x")).unwrap();
        let mut next = created;
        next.assignee = "sal".into();
        let updated = store.update(next, "op").unwrap();
        let assigned: Vec<_> = updated.events_of(EventKind::Assigned).collect();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].to.as_deref(), Some("sal"));
    }

    #[test]
    fn add_events_batch_is_all_or_nothing() {
        let (_dir, store) = store();
        let created = store.create(WorkItem::new("x")).unwrap();

        let batch = vec![
            ItemEvent::new(EventKind::Commented, "op").with_comment("ok"),
            ItemEvent::new(EventKind::StatusChanged, "op").transition("open", "bogus"),
        ];
        assert!(store.add_events(&created.id, batch).is_err());
        assert_eq!(store.get(&created.id).unwrap().history.len(), 1);

        let batch = vec![
            ItemEvent::new(EventKind::WorkStarted, "sal"),
            ItemEvent::new(EventKind::WorkCompleted, "sal"),
        ];
        let appended = store.add_events(&created.id, batch).unwrap();
        assert_eq!(appended.len(), 2);
        assert_eq!(store.get(&created.id).unwrap().history.len(), 3);
    }

    #[test]
    fn add_comment_stamps_event() {
        let (_dir, store) = store();
        let created = store.create(WorkItem::new("x")).unwrap();
        let event = store.add_comment(&created.id, "op", "looks good").unwrap();
        assert!(!event.is_unstamped());
        assert_eq!(event.comment.as_deref(), Some("looks good"));
        assert!(store.add_comment(&created.id, "op", "  ").is_err());
        assert!(matches!(
            store.add_comment("wd-none", "op", "hi"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn ready_scenario_from_blocking_edge() {
        let (_dir, store) = store();
        let x = store
            .create(WorkItem::new("X").with_priority(2).in_turf("w"))
            .unwrap();
        let y = store
            .create(WorkItem::new("Y").with_priority(0).in_turf("w").blocking(&x.id))
            .unwrap();

        assert_eq!(ids(&store.list_ready(Some("w")).unwrap()), [y.id.as_str()]);
        store.close(&y.id, "op", None).unwrap();
        assert_eq!(ids(&store.list_ready(Some("w")).unwrap()), [x.id.as_str()]);
    }

    #[test]
    fn blocked_by_and_blocking_follow_edge_direction() {
        let (_dir, store) = store();
        let b = store.create(WorkItem::new("b")).unwrap();
        let a = store.create(WorkItem::new("a").blocking(&b.id)).unwrap();

        assert_eq!(ids(&store.blocked_by(&b.id).unwrap()), [a.id.as_str()]);
        assert_eq!(ids(&store.blocking(&a.id).unwrap()), [b.id.as_str()]);
        assert!(store.blocked_by(&a.id).unwrap().is_empty());
        assert!(matches!(store.blocking("wd-none"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn dependency_edits_round_trip() {
        let (_dir, store) = store();
        let a = store.create(WorkItem::new("a")).unwrap();
        let b = store.create(WorkItem::new("b")).unwrap();

        assert!(store.add_dependency(&a.id, &b.id).unwrap().is_none());
        assert!(store.add_dependency(&a.id, &b.id).unwrap().is_none());
        assert_eq!(store.get(&a.id).unwrap().blocks, [b.id.clone()]);

        let warning = store.add_dependency(&b.id, &a.id).unwrap();
        assert!(warning.is_some());
        assert!(store.dependency_tree(&a.id).unwrap().has_cycles());

        assert!(store.remove_dependency(&b.id, &a.id).unwrap());
        assert!(!store.remove_dependency(&b.id, &a.id).unwrap());
        assert!(store.add_dependency(&a.id, &a.id).is_err());
        assert!(store.add_dependency(&a.id, "wd-none").is_err());
    }

    #[test]
    fn malformed_lines_are_skipped_and_preserved() {
        let (_dir, store) = store();
        let created = store.create(WorkItem::new("x")).unwrap();

        let mut content = std::fs::read_to_string(store.items_path()).unwrap();
        content.push_str("{not json\n");
        std::fs::write(store.items_path(), content).unwrap();

        assert_eq!(store.list(&ItemFilter::default()).unwrap().len(), 1);
        store.add_comment(&created.id, "op", "still writable").unwrap();

        let after = std::fs::read_to_string(store.items_path()).unwrap();
        assert!(after.contains("{not json"));
        assert_eq!(store.list(&ItemFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let (_dir, store) = store();
        assert!(store.list(&ItemFilter::default()).unwrap().is_empty());
        assert!(store.list_ready(None).unwrap().is_empty());
    }

    #[test]
    fn init_creates_empty_file() {
        let (_dir, store) = store();
        store.init().unwrap();
        assert!(store.items_path().exists());
        store.init().unwrap();
    }

    #[test]
    fn two_instances_share_one_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = Store::open(dir.path(), StoreConfig::default());
        let second = Store::open(dir.path(), StoreConfig::default());

        let a = first.create(WorkItem::new("from first")).unwrap();
        let b = second.create(WorkItem::new("from second")).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(first.list(&ItemFilter::default()).unwrap().len(), 2);
    }
}
