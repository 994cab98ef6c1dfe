//! Driver configuration stored under `.tdd/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Driver configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Fix cycles allowed per node before it is force-failed.
    pub max_retries: u32,

    pub test: TestConfig,

    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestConfig {
    /// Argv template; `{test_file}` and `{node_id}` are substituted per node.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    /// Truncate captured test output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            command: vec!["cargo".to_string(), "test".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

/// Where node files live when a node does not name them explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    pub spec_dir: String,
    pub spec_ext: String,
    pub action_dir: String,
    pub action_ext: String,
    pub test_dir: String,
    pub test_ext: String,
    /// Line comment marker used in generated skeleton headers.
    pub comment_prefix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            spec_dir: "specs".to_string(),
            spec_ext: "feature".to_string(),
            action_dir: "src/actions".to_string(),
            action_ext: "rs".to_string(),
            test_dir: "tests".to_string(),
            test_ext: "rs".to_string(),
            comment_prefix: "//".to_string(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            test: TestConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(anyhow!("max_retries must be > 0"));
        }
        if self.test.timeout_secs == 0 {
            return Err(anyhow!("test.timeout_secs must be > 0"));
        }
        if self.test.output_limit_bytes == 0 {
            return Err(anyhow!("test.output_limit_bytes must be > 0"));
        }
        if self.test.command.is_empty() || self.test.command[0].trim().is_empty() {
            return Err(anyhow!("test.command must be a non-empty array"));
        }
        for (name, value) in [
            ("layout.spec_dir", &self.layout.spec_dir),
            ("layout.action_dir", &self.layout.action_dir),
            ("layout.test_dir", &self.layout.test_dir),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DriverConfig::default()`.
pub fn load_config(path: &Path) -> Result<DriverConfig> {
    if !path.exists() {
        let cfg = DriverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DriverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DriverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
