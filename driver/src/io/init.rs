//! Canonical `.tdd/` paths and workspace scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{DriverConfig, write_config};
use super::workspace_store::{JsonNodeStore, NodeStore};
use crate::workspace::Workspace;

/// All canonical paths within `.tdd/` for a project root.
#[derive(Debug, Clone)]
pub struct DriverPaths {
    pub root: PathBuf,
    pub driver_dir: PathBuf,
    pub channel_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub workspace_path: PathBuf,
    pub task_path: PathBuf,
    pub response_path: PathBuf,
    pub status_path: PathBuf,
    pub state_path: PathBuf,
    pub events_path: PathBuf,
}

impl DriverPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let driver_dir = root.join(".tdd");
        let channel_dir = driver_dir.join("channel");
        let state_dir = driver_dir.join("state");
        Self {
            root: root.clone(),
            driver_dir: driver_dir.clone(),
            channel_dir: channel_dir.clone(),
            state_dir: state_dir.clone(),
            config_path: driver_dir.join("config.toml"),
            workspace_path: driver_dir.join("workspace.json"),
            task_path: channel_dir.join("task.md"),
            response_path: channel_dir.join("response.md"),
            status_path: channel_dir.join("status.md"),
            state_path: state_dir.join("driver_state.json"),
            events_path: driver_dir.join("events.jsonl"),
        }
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing driver-owned files.
    pub force: bool,
}

/// Create `.tdd/` scaffolding in `root`.
///
/// Fails if `.tdd/` already exists unless `options.force` is set.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<DriverPaths> {
    let paths = DriverPaths::new(root);
    if paths.driver_dir.exists() && !paths.driver_dir.is_dir() {
        return Err(anyhow!("init: .tdd exists but is not a directory"));
    }
    if paths.driver_dir.exists() && !options.force {
        return Err(anyhow!("init: .tdd already exists (use --force to overwrite)"));
    }

    for dir in [&paths.driver_dir, &paths.channel_dir, &paths.state_dir] {
        fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    }

    write_config(&paths.config_path, &DriverConfig::default())?;
    JsonNodeStore::new(&paths.workspace_path).save(&Workspace::default())?;

    Ok(paths)
}
