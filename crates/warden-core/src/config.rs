use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::WorkerKind;

/// Name of the per-project state directory.
pub const PROJECT_DIR: &str = ".warden";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub patrol: PatrolConfig,
    #[serde(default)]
    pub nudge: NudgeConfig,
    #[serde(default)]
    pub workers: Vec<WorkerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    #[serde(default = "default_workspace")]
    pub default_workspace: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default = "default_true")]
    pub cross_process_lock: bool,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            id_prefix: default_id_prefix(),
            default_workspace: default_workspace(),
            branch_prefix: default_branch_prefix(),
            cross_process_lock: default_true(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatrolConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl PatrolConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NudgeConfig {
    #[serde(default = "default_escalation_delay_secs")]
    pub escalation_delay_secs: u64,
    /// Bytes written to a worker's input stream for a wake signal.
    #[serde(default = "default_wake_input")]
    pub wake_input: String,
    /// Payload of the hook message written at the mailbox level.
    #[serde(default = "default_nudge_message")]
    pub message: String,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            escalation_delay_secs: default_escalation_delay_secs(),
            wake_input: default_wake_input(),
            message: default_nudge_message(),
        }
    }
}

impl NudgeConfig {
    #[must_use]
    pub const fn escalation_delay(&self) -> Duration {
        Duration::from_secs(self.escalation_delay_secs)
    }
}

/// A worker the patrol may (re)spawn itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub name: String,
    #[serde(default)]
    pub kind: WorkerKind,
    #[serde(default)]
    pub command: Vec<String>,
    /// Extra arguments appended when respawning; `{session}` is replaced with
    /// the prior session reference.
    #[serde(default)]
    pub resume_args: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_id_prefix() -> String {
    "wd".to_string()
}

fn default_workspace() -> String {
    "default".to_string()
}

fn default_branch_prefix() -> String {
    "work".to_string()
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}

const fn default_interval_secs() -> u64 {
    120
}

const fn default_stale_after_secs() -> u64 {
    300
}

const fn default_escalation_delay_secs() -> u64 {
    30
}

fn default_wake_input() -> String {
    "\n".to_string()
}

fn default_nudge_message() -> String {
    "You look stalled. Re-read your hook and resume your current work item.".to_string()
}

/// State directory for a project rooted at `project_root`.
#[must_use]
pub fn project_dir(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR)
}

/// Load the effective config for a project: defaults, overlaid by the user
/// config (`~/.config/warden/config.toml`), overlaid by
/// `<root>/.warden/config.toml`. Tables merge key by key; any other value,
/// including the `workers` array, is replaced by the later layer.
///
/// # Errors
///
/// Returns [`Error::Storage`] if an existing file cannot be read and
/// [`Error::Config`] if it does not parse.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let project_path = project_dir(project_root).join("config.toml");
    load_layered(user_config_path().as_deref(), &project_path)
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("warden").join("config.toml"))
}

fn load_layered(user_path: Option<&Path>, project_path: &Path) -> Result<ProjectConfig> {
    let mut merged = toml::Table::new();
    for path in user_path.into_iter().chain([project_path]) {
        if path.exists() {
            merge_tables(&mut merged, load_table(path)?);
        }
    }
    toml::Value::Table(merged)
        .try_into()
        .map_err(|err: toml::de::Error| Error::Config {
            path: project_path.to_path_buf(),
            reason: err.to_string(),
        })
}

/// Read one layer, rejecting it on its own before it is merged so errors name
/// the file at fault.
fn load_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path).map_err(|err| Error::storage(path, err))?;
    let config_error = |reason| Error::Config {
        path: path.to_path_buf(),
        reason,
    };
    parse_config(&content).map_err(config_error)?;
    toml::from_str(&content).map_err(|err: toml::de::Error| config_error(err.to_string()))
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_config(content: &str) -> std::result::Result<ProjectConfig, String> {
    toml::from_str::<ProjectConfig>(content).map_err(|err| err.to_string())
}

/// Render the default config as TOML for `wd init`.
///
/// # Errors
///
/// Returns [`Error::Config`] if serialization fails.
pub fn default_config_toml() -> Result<String> {
    toml::to_string_pretty(&ProjectConfig::default()).map_err(|err| Error::Config {
        path: PathBuf::from("config.toml"),
        reason: err.to_string(),
    })
}
