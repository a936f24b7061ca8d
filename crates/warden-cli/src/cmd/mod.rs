pub mod close;
pub mod comment;
pub mod completions;
pub mod create;
pub mod dep;
pub mod hook;
pub mod init;
pub mod list;
pub mod nudge;
pub mod patrol;
pub mod ready;
pub mod show;
pub mod update;
pub mod worker;

use std::path::{Path, PathBuf};

use warden_core::config::{self, PROJECT_DIR, ProjectConfig};
use warden_core::heartbeat::HeartbeatDir;
use warden_core::hook::HookStore;
use warden_core::model::WorkItem;
use warden_core::store::Store;

use crate::actor;

/// No `.warden/` directory at or above the working directory.
#[derive(Debug)]
pub struct NotInitialized {
    pub start: PathBuf,
}

impl std::fmt::Display for NotInitialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "no {PROJECT_DIR}/ directory found at or above {}",
            self.start.display()
        )
    }
}

impl std::error::Error for NotInitialized {}

/// A discovered project: its root, state directory, and loaded config.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    /// Walk up from `start` until a `.warden/` directory is found.
    ///
    /// # Errors
    ///
    /// [`NotInitialized`] when no project exists, or a config error.
    pub fn discover(start: &Path) -> anyhow::Result<Self> {
        let mut current = start.to_path_buf();
        loop {
            let candidate = config::project_dir(&current);
            if candidate.is_dir() {
                let config = config::load_project_config(&current)?;
                return Ok(Self {
                    root: current,
                    state_dir: candidate,
                    config,
                });
            }
            if !current.pop() {
                return Err(NotInitialized {
                    start: start.to_path_buf(),
                }
                .into());
            }
        }
    }

    pub fn store(&self) -> Store {
        Store::open(&self.state_dir, self.config.store.clone())
    }

    pub fn hooks(&self) -> HookStore {
        HookStore::new(&self.state_dir)
    }

    pub fn heartbeats(&self) -> HeartbeatDir {
        HeartbeatDir::new(&self.state_dir)
    }
}

/// Resolve the actor for a mutating command.
pub fn require_actor(actor_flag: Option<&str>) -> anyhow::Result<String> {
    Ok(actor::require_actor(actor_flag)?)
}

/// One-line summary shared by list-style commands in text mode.
pub fn item_row(item: &WorkItem) -> String {
    format!(
        "{}  {}  P{}  {}  {}",
        item.id, item.status, item.priority, item.turf, item.title
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_walks_up_to_project_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let project = Project::discover(&nested).unwrap();
        assert_eq!(project.root, dir.path());
        assert_eq!(project.state_dir, dir.path().join(PROJECT_DIR));
    }

    #[test]
    fn discover_without_project_is_not_initialized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Project::discover(dir.path()).unwrap_err();
        assert!(err.downcast_ref::<NotInitialized>().is_some());
    }

    #[test]
    fn item_row_has_id_status_priority() {
        let mut item = WorkItem::new("Fix it").with_priority(1).in_turf("api");
        item.id = "wd-abcd".into();
        assert_eq!(item_row(&item), "wd-abcd  open  P1  api  Fix it");
    }
}
