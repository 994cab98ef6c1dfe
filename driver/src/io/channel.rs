//! File-based request/response channel shared with the external agent.
//!
//! One request artifact, one response artifact, one status artifact, and the
//! persisted driver state. No business logic lives here.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::init::DriverPaths;
use super::run_state::{clear_driver_state, load_driver_state, write_driver_state};
use crate::core::response::parse_response;
use crate::core::types::{AgentResponse, DriverState};

#[derive(Debug, Clone)]
pub struct ProtocolChannel {
    task_path: PathBuf,
    response_path: PathBuf,
    status_path: PathBuf,
    state_path: PathBuf,
}

impl ProtocolChannel {
    pub fn new(paths: &DriverPaths) -> Self {
        Self {
            task_path: paths.task_path.clone(),
            response_path: paths.response_path.clone(),
            status_path: paths.status_path.clone(),
            state_path: paths.state_path.clone(),
        }
    }

    pub fn task_path(&self) -> &Path {
        &self.task_path
    }

    pub fn response_path(&self) -> &Path {
        &self.response_path
    }

    /// Overwrite the request artifact and drop any pending response, starting a
    /// fresh request/response pairing.
    pub fn write_task(&self, content: &str) -> Result<()> {
        self.clear_response()?;
        write_text(&self.task_path, content)?;
        info!(path = %self.task_path.display(), bytes = content.len(), "task written");
        Ok(())
    }

    /// Parse the response artifact. Missing or blank means no response yet.
    pub fn read_response(&self) -> Option<AgentResponse> {
        let raw = match fs::read_to_string(&self.response_path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    debug!(error = %err, "response unreadable, treating as absent");
                }
                return None;
            }
        };
        parse_response(&raw)
    }

    pub fn clear_response(&self) -> Result<()> {
        remove_if_exists(&self.response_path)
    }

    /// Human-readable COMPLETE/FAILED/ERROR summaries for whoever watches the channel.
    pub fn write_status(&self, content: &str) -> Result<()> {
        write_text(&self.status_path, content)
    }

    pub fn save_state(&self, state: &DriverState) -> Result<()> {
        write_driver_state(&self.state_path, state)
    }

    pub fn load_state(&self) -> Option<DriverState> {
        load_driver_state(&self.state_path)
    }

    pub fn clear_state(&self) -> Result<()> {
        clear_driver_state(&self.state_path)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}
