//! Selection helper for `tdd-driver select`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::selector::select_next;
use crate::io::channel::ProtocolChannel;
use crate::io::init::DriverPaths;
use crate::io::workspace_store::{JsonNodeStore, NodeStore};

/// Id of the node the backlog driver would work on next, taking the persisted
/// run's processed list into account. `None` means nothing is eligible.
pub fn select_from_root(root: &Path) -> Result<Option<String>> {
    let paths = DriverPaths::new(root);
    let workspace = JsonNodeStore::new(&paths.workspace_path)
        .load()
        .context("load workspace for selection")?;
    let processed = ProtocolChannel::new(&paths)
        .load_state()
        .map(|state| state.processed_node_ids)
        .unwrap_or_default();
    Ok(select_next(&workspace, &processed).map(|node| node.key()))
}
