//! `wd init`: create the `.warden/` state directory.

use std::path::Path;

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use warden_core::config::{self, ProjectConfig};
use warden_core::store::Store;

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite config.toml with defaults even if `.warden/` already exists.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "heartbeats/\nhooks/\nitems.lock\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    path: String,
    created: bool,
}

/// Execute `wd init`. Creates the project skeleton:
///
/// ```text
/// .warden/
///   items.jsonl   (empty work-item store)
///   config.toml   (default config)
///   .gitignore    (runtime files: heartbeats/, hooks/, items.lock)
/// ```
///
/// # Errors
///
/// Returns an error if `.warden/` already exists and `--force` is not set,
/// or if any filesystem operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let state_dir = config::project_dir(project_root);
    let existed = state_dir.exists();

    if existed && !args.force {
        anyhow::bail!(".warden/ already exists. Use `wd init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("Failed to create {}", state_dir.display()))?;

    let store_config = if existed {
        config::load_project_config(project_root)
            .map(|c| c.store)
            .unwrap_or_default()
    } else {
        ProjectConfig::default().store
    };
    Store::open(&state_dir, store_config).init()?;

    let config_path = state_dir.join("config.toml");
    std::fs::write(&config_path, config::default_config_toml()?)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let gitignore_path = state_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write {}", gitignore_path.display()))?;

    tracing::info!(path = %state_dir.display(), "initialized project");

    let result = InitOutput {
        ok: true,
        path: state_dir.display().to_string(),
        created: !existed,
    };
    render(output, &result, |r, w| {
        writeln!(w, "✓ Initialized warden project at {}", r.path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_skeleton() {
        let dir = tempfile::tempdir().expect("tempdir");
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).unwrap();

        let state = dir.path().join(".warden");
        assert!(state.join("items.jsonl").exists());
        assert!(state.join("config.toml").exists());
        assert!(state.join(".gitignore").exists());
    }

    #[test]
    fn init_twice_requires_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).unwrap();
        assert!(run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).is_err());
        run_init(&InitArgs { force: true }, OutputMode::Json, dir.path()).unwrap();
    }
}
