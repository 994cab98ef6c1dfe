//! Shared deterministic types for the driver core.
//!
//! These types define stable contracts between core components and the
//! persisted state file. They must not depend on external state or I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parsed content of the response artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentResponse {
    /// The agent finished the requested work, optionally describing its approach.
    Done { approach: Option<String> },
    /// The agent cannot make progress on the current node.
    Stuck { reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

/// Per-node workflow step.
///
/// `Scaffold` and `Testing` are synchronous local steps; every other non-idle
/// phase waits on the external agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Blueprint,
    Bdd,
    Scaffold,
    Generating,
    Testing,
    Fixing,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Blueprint => "blueprint",
            Phase::Bdd => "bdd",
            Phase::Scaffold => "scaffold",
            Phase::Generating => "generating",
            Phase::Testing => "testing",
            Phase::Fixing => "fixing",
            Phase::Done => "done",
        }
    }

    /// Phases in which a response from the agent is expected.
    pub fn awaits_agent(self) -> bool {
        matches!(
            self,
            Phase::Blueprint | Phase::Bdd | Phase::Generating | Phase::Fixing
        )
    }
}

/// Caller-selected subset of the per-node workflow.
///
/// `test` covers scaffold + test generation; `fix` covers test execution and
/// the fix loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSet {
    pub bdd: bool,
    pub test: bool,
    pub fix: bool,
}

impl PhaseSet {
    pub const ALL: PhaseSet = PhaseSet {
        bdd: true,
        test: true,
        fix: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.bdd || self.test || self.fix)
    }

    /// First phase to enter for a node under this subset.
    pub fn entry(&self) -> Option<Phase> {
        if self.bdd {
            Some(Phase::Bdd)
        } else if self.test {
            Some(Phase::Scaffold)
        } else if self.fix {
            Some(Phase::Testing)
        } else {
            None
        }
    }
}

impl Default for PhaseSet {
    fn default() -> Self {
        Self::ALL
    }
}

/// Which driver variant owns the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RunMode {
    /// Walk the full backlog in dependency order.
    #[default]
    Backlog,
    /// Drive one node through a subset of phases.
    Single { node_id: String, phases: PhaseSet },
}

impl RunMode {
    pub fn phases(&self) -> PhaseSet {
        match self {
            RunMode::Backlog => PhaseSet::ALL,
            RunMode::Single { phases, .. } => *phases,
        }
    }
}

/// One recorded fix attempt for the current node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub attempt_number: u32,
    pub approach_description: String,
    pub timestamp: DateTime<Utc>,
}

/// Terminal outcome of a node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeOutcome {
    Passed,
    Failed,
    /// The phase subset excluded test execution.
    Unverified,
}

/// Persisted driver progress (`.tdd/state/driver_state.json`).
///
/// Single source of truth for resuming an interrupted run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverState {
    pub run_status: RunStatus,
    pub phase: Phase,
    #[serde(default)]
    pub mode: RunMode,
    pub current_node_id: Option<String>,
    pub current_retry: u32,
    pub max_retries: u32,
    /// Append-only per run; each id appears once.
    pub processed_node_ids: Vec<String>,
    /// Always a subset of `processed_node_ids`.
    pub failed_node_ids: Vec<String>,
    /// Processed without running tests; subset of `processed_node_ids`.
    #[serde(default)]
    pub unverified_node_ids: Vec<String>,
    pub fix_attempts: Vec<FixAttempt>,
    /// Whether the request for the current phase reached the channel.
    #[serde(default)]
    pub task_dispatched: bool,
    /// A response already removed from the channel whose transition has not
    /// been persisted yet. Replayed by resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_response: Option<AgentResponse>,
}

impl DriverState {
    pub fn new(mode: RunMode, max_retries: u32) -> Self {
        Self {
            run_status: RunStatus::Running,
            mode,
            max_retries,
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_status == RunStatus::Running
    }

    pub fn passed_count(&self) -> usize {
        self.processed_node_ids
            .len()
            .saturating_sub(self.failed_node_ids.len())
            .saturating_sub(self.unverified_node_ids.len())
    }
}
