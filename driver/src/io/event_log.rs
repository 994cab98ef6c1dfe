//! Append-only event log (`.tdd/events.jsonl`).
//!
//! Product record of a run, unlike tracing output. Write failures are logged
//! and swallowed so an observer can never break the driver.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::events::{DriverEvent, DriverObserver};

#[derive(Serialize)]
struct LogLine<'a> {
    at: String,
    #[serde(flatten)]
    event: &'a DriverEvent,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &DriverEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let line = LogLine {
            at: Utc::now().to_rfc3339(),
            event,
        };
        let mut buf = serde_json::to_string(&line).context("serialize event")?;
        buf.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(buf.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))
    }
}

impl DriverObserver for EventLog {
    fn on_event(&mut self, event: &DriverEvent) {
        if let Err(err) = self.append(event) {
            warn!(error = %format!("{err:#}"), "event log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Phase, RunStatus};

    #[test]
    fn appends_one_json_line_per_event() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut log = EventLog::new(temp.path().join("nested/events.jsonl"));
        log.on_event(&DriverEvent::StatusChanged {
            run_status: RunStatus::Running,
            phase: Phase::Bdd,
        });
        log.on_event(&DriverEvent::RunCompleted {
            summary: "1/1 passed".to_string(),
        });

        let contents = fs::read_to_string(log.path()).expect("read");
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "status_changed");
        assert_eq!(lines[0]["phase"], "bdd");
        assert_eq!(lines[1]["summary"], "1/1 passed");
        assert!(lines[1]["at"].is_string());
    }
}
