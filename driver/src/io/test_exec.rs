//! Test execution collaborator and its command-line implementation.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Deserialize;
use tracing::{debug, info};

use super::config::{LayoutConfig, TestConfig};
use super::process::run_command_with_timeout;
use crate::workspace::{TestResult, WorkNode};

const ERROR_TAIL_BYTES: usize = 4_000;

/// Runs a node's tests. Errors are folded into a failed test cycle by the driver.
pub trait TestExecutor {
    fn run(&self, node: &WorkNode) -> Result<Vec<TestResult>>;
}

/// Runs the configured test command in the workspace root.
///
/// Each stdout line that parses as `{"title", "passed", "error"?}` is one
/// result. When no line parses, the exit status becomes a single result.
#[derive(Debug, Clone)]
pub struct CommandTestExecutor {
    root: PathBuf,
    config: TestConfig,
    layout: LayoutConfig,
}

#[derive(Debug, Deserialize)]
struct ReportLine {
    title: String,
    passed: bool,
    #[serde(default)]
    error: Option<String>,
}

impl CommandTestExecutor {
    pub fn new(root: impl Into<PathBuf>, config: TestConfig, layout: LayoutConfig) -> Self {
        Self {
            root: root.into(),
            config,
            layout,
        }
    }

    fn argv(&self, node: &WorkNode) -> Vec<String> {
        let test_file = node.paths(&self.layout).test_file.display().to_string();
        self.config
            .command
            .iter()
            .map(|arg| {
                arg.replace("{test_file}", &test_file)
                    .replace("{node_id}", &node.id)
            })
            .collect()
    }
}

impl TestExecutor for CommandTestExecutor {
    fn run(&self, node: &WorkNode) -> Result<Vec<TestResult>> {
        let argv = self.argv(node);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("test command is empty"))?;
        info!(node = %node.id, command = ?argv, "running tests");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.root);
        let output = run_command_with_timeout(
            cmd,
            Duration::from_secs(self.config.timeout_secs),
            self.config.output_limit_bytes,
        )?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut results = parse_report_lines(&stdout);
        if results.is_empty() {
            let title = node.paths(&self.layout).test_file.display().to_string();
            let error = if output.success() {
                None
            } else if output.timed_out {
                Some(format!("timed out after {}s", self.config.timeout_secs))
            } else {
                Some(tail(&output.combined(), ERROR_TAIL_BYTES))
            };
            results.push(TestResult {
                title,
                passed: output.success(),
                error,
            });
        }
        debug!(node = %node.id, results = results.len(), "tests finished");
        Ok(results)
    }
}

fn parse_report_lines(stdout: &str) -> Vec<TestResult> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<ReportLine>(line.trim()).ok())
        .map(|line| TestResult {
            title: line.title,
            passed: line.passed,
            error: line.error,
        })
        .collect()
}

fn tail(text: &str, max_bytes: usize) -> String {
    let trimmed = text.trim_end();
    if trimmed.len() <= max_bytes {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - max_bytes;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated]\n{}", &trimmed[start..])
}
