//! Workspace load/save behind the [`NodeStore`] seam.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::workspace::Workspace;

/// Storage collaborator for nodes and edges.
///
/// The driver reloads the workspace before each decision and saves after each
/// in-place annotation; it never deletes records.
pub trait NodeStore {
    fn load(&self) -> Result<Workspace>;
    fn save(&self, workspace: &Workspace) -> Result<()>;
}

/// JSON file store (`.tdd/workspace.json`).
#[derive(Debug, Clone)]
pub struct JsonNodeStore {
    path: PathBuf,
}

impl JsonNodeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NodeStore for JsonNodeStore {
    /// A missing file is an empty workspace.
    fn load(&self) -> Result<Workspace> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "workspace missing, using empty");
            return Ok(Workspace::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read workspace {}", self.path.display()))?;
        let workspace: Workspace = serde_json::from_str(&contents)
            .with_context(|| format!("parse workspace {}", self.path.display()))?;
        debug!(
            nodes = workspace.nodes.len(),
            edges = workspace.edges.len(),
            "workspace loaded"
        );
        Ok(workspace)
    }

    fn save(&self, workspace: &Workspace) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(workspace).context("serialize workspace")?;
        buf.push('\n');
        super::write_atomic(&self.path, &buf)
    }
}
