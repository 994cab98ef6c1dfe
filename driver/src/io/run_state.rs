//! Persisted driver state (`.tdd/state/driver_state.json`).

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::types::DriverState;

/// Load driver state, tolerating a missing, empty, or corrupt file.
///
/// Returns `None` rather than an error in all of those cases; a corrupt file is
/// logged and otherwise ignored.
pub fn load_driver_state(path: &Path) -> Option<DriverState> {
    debug!(path = %path.display(), "loading driver state");
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unreadable driver state ignored");
            return None;
        }
    };
    if contents.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<DriverState>(&contents) {
        Ok(state) => {
            debug!(
                run_status = state.run_status.as_str(),
                phase = state.phase.as_str(),
                node = ?state.current_node_id,
                "driver state loaded"
            );
            Some(state)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "corrupt driver state ignored");
            None
        }
    }
}

/// Atomically write driver state to disk (temp file + rename).
pub fn write_driver_state(path: &Path, state: &DriverState) -> Result<()> {
    debug!(
        path = %path.display(),
        phase = state.phase.as_str(),
        node = ?state.current_node_id,
        retry = state.current_retry,
        "writing driver state"
    );
    let mut buf = serde_json::to_string_pretty(state).context("serialize driver state")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

/// Remove persisted state. Missing file is not an error.
pub fn clear_driver_state(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove driver state {}", path.display())),
    }
}
