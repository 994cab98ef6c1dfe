//! Phase state machine driving nodes through the TDD workflow.
//!
//! One [`Driver`] serves both variants: the backlog driver walks every
//! eligible node in dependency order, the single-node driver runs a subset of
//! phases for one node. Neither blocks on the agent. Each agent-facing phase
//! writes a task and returns; the next step happens when
//! [`Driver::on_external_signal`] is invoked by whatever watches the channel.
//!
//! ```text
//! [blueprint] -> idle -> bdd -> scaffold -> generating -> testing -> pass -> idle | done
//!                                                           |  ^
//!                                                           v  |
//!                                                          fixing (until max_retries)
//! ```
//!
//! State is persisted before every task write and after every transition, so
//! a fresh process can pick the run up again with [`Driver::resume`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::core::retry;
use crate::core::selector::select_next;
use crate::core::types::{AgentResponse, DriverState, NodeOutcome, Phase, RunMode, RunStatus};
use crate::core::verdict::{run_summary, tests_passed};
use crate::events::{DriverEvent, DriverObserver, EventBus};
use crate::io::channel::ProtocolChannel;
use crate::io::config::{DriverConfig, load_config};
use crate::io::event_log::EventLog;
use crate::io::init::DriverPaths;
use crate::io::prompt::{TemplateGenerator, TextGenerator, compose_request};
use crate::io::scaffold::{FsScaffolder, Scaffolder, dependency_wiring};
use crate::io::test_exec::{CommandTestExecutor, TestExecutor};
use crate::io::workspace_store::{JsonNodeStore, NodeStore};
use crate::workspace::{NodeStatus, WorkNode, Workspace};

/// External collaborators, constructed once per workspace session.
pub struct Collaborators {
    pub store: Box<dyn NodeStore>,
    pub generator: Box<dyn TextGenerator>,
    pub tests: Box<dyn TestExecutor>,
    pub scaffolder: Box<dyn Scaffolder>,
}

impl Collaborators {
    /// Default file-backed collaborators for a workspace root.
    pub fn from_config(paths: &DriverPaths, config: &DriverConfig) -> Result<Self> {
        let generator = TemplateGenerator::new(
            config.layout.clone(),
            &relative(paths, &paths.workspace_path),
            &relative(paths, &paths.response_path),
        )?;
        Ok(Self {
            store: Box::new(JsonNodeStore::new(&paths.workspace_path)),
            generator: Box::new(generator),
            tests: Box::new(CommandTestExecutor::new(
                &paths.root,
                config.test.clone(),
                config.layout.clone(),
            )),
            scaffolder: Box::new(FsScaffolder::new(&paths.root, config.layout.clone())),
        })
    }
}

fn relative(paths: &DriverPaths, path: &Path) -> String {
    path.strip_prefix(&paths.root)
        .unwrap_or(path)
        .display()
        .to_string()
}

pub struct Driver {
    root: PathBuf,
    config: DriverConfig,
    channel: ProtocolChannel,
    deps: Collaborators,
    events: EventBus,
    state: DriverState,
}

impl Driver {
    /// Build a driver and load any persisted run into memory.
    pub fn open(paths: &DriverPaths, config: DriverConfig, deps: Collaborators) -> Self {
        let channel = ProtocolChannel::new(paths);
        let state = channel.load_state().unwrap_or_default();
        Self {
            root: paths.root.clone(),
            config,
            channel,
            deps,
            events: EventBus::default(),
            state,
        }
    }

    /// Driver with default collaborators and the `.tdd/events.jsonl` log attached.
    pub fn from_root(root: &Path) -> Result<Self> {
        let paths = DriverPaths::new(root);
        let config = load_config(&paths.config_path)?;
        let deps = Collaborators::from_config(&paths, &config)?;
        let mut driver = Self::open(&paths, config, deps);
        driver.subscribe(Box::new(EventLog::new(&paths.events_path)));
        Ok(driver)
    }

    pub fn subscribe(&mut self, observer: Box<dyn DriverObserver>) {
        self.events.subscribe(observer);
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn channel(&self) -> &ProtocolChannel {
        &self.channel
    }

    /// Begin a new run, replacing any unfinished one.
    pub fn start(&mut self, mode: RunMode) -> RunStatus {
        if self.state.is_running() {
            warn!(node = ?self.state.current_node_id, "replacing unfinished run");
        }
        info!(?mode, max_retries = self.config.max_retries, "starting run");
        self.state = DriverState::new(mode, self.config.max_retries);
        self.guarded(Self::begin_run)
    }

    /// React to a possible agent response. No-op unless running and waiting.
    pub fn on_external_signal(&mut self) -> RunStatus {
        if !self.state.is_running() {
            debug!(status = self.state.run_status.as_str(), "signal ignored, driver not running");
            return self.state.run_status;
        }
        if !self.state.phase.awaits_agent() {
            debug!(phase = self.state.phase.as_str(), "signal ignored, no task outstanding");
            return self.state.run_status;
        }
        let Some(response) = self.channel.read_response() else {
            debug!("no response yet");
            return self.state.run_status;
        };
        self.guarded(|driver| driver.handle_response(response))
    }

    /// Continue a run from its last durable state.
    ///
    /// Replays a consumed response whose transition never landed, processes a
    /// pending response, re-issues a task that never reached the channel, or
    /// re-runs an interrupted local phase. A run halted by an error
    /// is reloaded from disk first.
    pub fn resume(&mut self) -> RunStatus {
        if self.state.run_status == RunStatus::Error {
            self.state = self.channel.load_state().unwrap_or_default();
        }
        if !self.state.is_running() {
            return self.state.run_status;
        }
        if let Some(response) = self.state.pending_response.clone() {
            info!(phase = self.state.phase.as_str(), "replaying response consumed before a failure");
            return self.guarded(|driver| driver.handle_response(response));
        }
        let phase = self.state.phase;
        if phase.awaits_agent() {
            if self.channel.read_response().is_some() {
                return self.on_external_signal();
            }
            if self.state.task_dispatched {
                debug!(phase = phase.as_str(), "waiting for agent");
                return self.state.run_status;
            }
            info!(phase = phase.as_str(), "re-dispatching task lost before reaching the channel");
            return self.guarded(|driver| driver.enter_phase(phase));
        }
        self.guarded(|driver| match phase {
            Phase::Scaffold | Phase::Testing => driver.enter_phase(phase),
            Phase::Idle => driver.continue_from_idle(),
            _ => Ok(()),
        })
    }

    /// Pause the run and drop persisted state. An already dispatched task is
    /// not recalled; its response will simply be ignored.
    pub fn stop(&mut self) -> RunStatus {
        info!(node = ?self.state.current_node_id, "stopping driver");
        self.state.run_status = RunStatus::Paused;
        if let Err(err) = self.channel.clear_state() {
            self.fail_run(&err);
            return self.state.run_status;
        }
        self.emit_status();
        self.state.run_status
    }

    fn guarded(&mut self, step: impl FnOnce(&mut Self) -> Result<()>) -> RunStatus {
        if let Err(err) = step(self) {
            self.fail_run(&err);
        }
        self.state.run_status
    }

    fn begin_run(&mut self) -> Result<()> {
        if let RunMode::Single { node_id, phases } = self.state.mode.clone() {
            if phases.is_empty() {
                bail!("no phases selected for node '{node_id}'");
            }
            let workspace = self.deps.store.load()?;
            let node = workspace
                .node(&node_id)
                .ok_or_else(|| anyhow!("unknown node '{node_id}'"))?;
            if !node.is_work() {
                bail!("node '{node_id}' groups other nodes and has no work of its own");
            }
            // Normalize to the qualified key so processed ids match.
            self.state.mode = RunMode::Single {
                node_id: node.key(),
                phases,
            };
        }

        self.save()?;
        self.emit_status();
        match self.state.mode.clone() {
            RunMode::Backlog => {
                let workspace = self.deps.store.load()?;
                if workspace.work_node_count() == 0 {
                    info!("workspace has no work nodes, requesting blueprint");
                    return self.enter_phase(Phase::Blueprint);
                }
                self.advance()
            }
            RunMode::Single { node_id, .. } => self.begin_node(&node_id),
        }
    }

    fn handle_response(&mut self, response: AgentResponse) -> Result<()> {
        // Record the response durably, then consume it. The next save drops the
        // record, so it is replayed only if the transition fails before then.
        self.state.pending_response = Some(response.clone());
        self.save()?;
        self.channel.clear_response()?;
        self.state.pending_response = None;
        let phase = self.state.phase;
        info!(
            phase = phase.as_str(),
            node = ?self.state.current_node_id,
            ?response,
            "response received"
        );

        let phases = self.state.mode.phases();
        match response {
            AgentResponse::Stuck { reason } => {
                if phase == Phase::Blueprint {
                    // Halt, but leave the blueprint request to be issued again.
                    self.state.task_dispatched = false;
                    self.save()?;
                    bail!("agent stuck while blueprinting: {reason}");
                }
                self.finish_node(NodeOutcome::Failed, Some(format!("agent stuck: {reason}")))
            }
            AgentResponse::Done { approach } => match phase {
                Phase::Blueprint => {
                    let workspace = self.deps.store.load()?;
                    self.events.emit(DriverEvent::BlueprintComplete {
                        node_count: workspace.work_node_count(),
                    });
                    self.advance()
                }
                Phase::Bdd if phases.test => self.enter_phase(Phase::Scaffold),
                Phase::Bdd | Phase::Generating if phases.fix => self.enter_phase(Phase::Testing),
                Phase::Bdd | Phase::Generating => self.finish_node(NodeOutcome::Unverified, None),
                Phase::Fixing => {
                    retry::record_attempt(&mut self.state, approach.as_deref(), Utc::now());
                    self.enter_phase(Phase::Testing)
                }
                other => bail!("unexpected response in phase {}", other.as_str()),
            },
        }
    }

    fn enter_phase(&mut self, phase: Phase) -> Result<()> {
        self.set_phase(phase);
        match phase {
            Phase::Blueprint => {
                let body = self.deps.generator.blueprint_task()?;
                self.dispatch(&compose_request(None, &body, None))
            }
            Phase::Bdd => {
                let (workspace, node) = self.current_node()?;
                let spec_path = self.root.join(node.paths(&self.config.layout).spec_file);
                ensure_spec_stub(&spec_path)?;
                let wiring = dependency_wiring(&workspace, &node, &self.config.layout);
                let body = self.deps.generator.bdd_task(&node, &wiring)?;
                let spec = self.read_spec(&node);
                self.dispatch(&compose_request(spec.as_deref(), &body, None))
            }
            Phase::Scaffold => {
                self.save()?;
                let (workspace, node) = self.current_node()?;
                let wiring = dependency_wiring(&workspace, &node, &self.config.layout);
                let spec = self.read_spec(&node);
                let created = self
                    .deps
                    .scaffolder
                    .ensure_skeleton(&node, &wiring, spec.as_deref())?;
                info!(node = %node.id, created = created.len(), "scaffold complete");
                self.enter_phase(Phase::Generating)
            }
            Phase::Generating => {
                let (workspace, node) = self.current_node()?;
                let wiring = dependency_wiring(&workspace, &node, &self.config.layout);
                let spec = self.read_spec(&node);
                let body = self
                    .deps
                    .generator
                    .implement_task(&node, spec.as_deref(), &wiring)?;
                self.dispatch(&compose_request(spec.as_deref(), &body, None))
            }
            Phase::Testing => {
                self.save()?;
                self.run_tests()
            }
            Phase::Fixing => {
                let (_, node) = self.current_node()?;
                let results = node.last_test_results.clone().unwrap_or_default();
                let body = self.deps.generator.fix_task(
                    &node,
                    &results,
                    &self.state.fix_attempts,
                    self.state.current_retry,
                )?;
                let spec = self.read_spec(&node);
                let footer = (self.state.current_retry, self.state.max_retries);
                self.dispatch(&compose_request(spec.as_deref(), &body, Some(footer)))
            }
            Phase::Idle | Phase::Done => Ok(()),
        }
    }

    fn run_tests(&mut self) -> Result<()> {
        let (mut workspace, node) = self.current_node()?;
        let results = match self.deps.tests.run(&node) {
            Ok(results) => results,
            Err(err) => {
                warn!(node = %node.id, error = %format!("{err:#}"), "test execution failed");
                Vec::new()
            }
        };
        if let Some(stored) = workspace.node_mut(&node.key()) {
            stored.last_test_results = Some(results.clone());
        }
        self.deps.store.save(&workspace)?;
        let passed = tests_passed(&results);
        info!(
            node = %node.id,
            executed = results.len(),
            passed,
            retry = self.state.current_retry,
            "tests finished"
        );
        self.events.emit(DriverEvent::TestResults {
            node_id: node.key(),
            results,
        });

        if passed {
            return self.finish_node(NodeOutcome::Passed, None);
        }
        if retry::retries_exhausted(&self.state) {
            let reason = format!(
                "tests still failing after {} fix attempts",
                self.state.current_retry
            );
            return self.finish_node(NodeOutcome::Failed, Some(reason));
        }
        self.state.current_retry += 1;
        self.enter_phase(Phase::Fixing)
    }

    fn advance(&mut self) -> Result<()> {
        let workspace = self.deps.store.load()?;
        if let Some(node) = select_next(&workspace, &self.state.processed_node_ids) {
            let node_id = node.key();
            return self.begin_node(&node_id);
        }
        let starved = unprocessed_work(&workspace, &self.state.processed_node_ids);
        if starved > 0 {
            warn!(starved, "no eligible node left but some were never processed");
        }
        self.complete_run()
    }

    fn continue_from_idle(&mut self) -> Result<()> {
        match self.state.mode.clone() {
            RunMode::Backlog => self.advance(),
            RunMode::Single { node_id, .. } => {
                if self.state.processed_node_ids.contains(&node_id) {
                    self.complete_run()
                } else {
                    self.begin_node(&node_id)
                }
            }
        }
    }

    fn begin_node(&mut self, node_id: &str) -> Result<()> {
        info!(node = node_id, "starting node");
        self.state.current_node_id = Some(node_id.to_string());
        self.state.current_retry = 0;
        self.state.fix_attempts.clear();
        let entry = self
            .state
            .mode
            .phases()
            .entry()
            .ok_or_else(|| anyhow!("no phases selected"))?;
        self.enter_phase(entry)
    }

    fn finish_node(&mut self, outcome: NodeOutcome, reason: Option<String>) -> Result<()> {
        let node_id = self
            .state
            .current_node_id
            .clone()
            .ok_or_else(|| anyhow!("no current node to finish"))?;

        let mut workspace = self.deps.store.load()?;
        if let Some(node) = workspace.node_mut(&node_id) {
            match outcome {
                NodeOutcome::Passed => {
                    node.status = NodeStatus::Passed;
                    node.failure_reason = None;
                }
                NodeOutcome::Failed => {
                    node.status = NodeStatus::Failed;
                    node.failure_reason = reason.clone();
                }
                NodeOutcome::Unverified => {}
            }
        }
        self.deps.store.save(&workspace)?;

        if !self.state.processed_node_ids.contains(&node_id) {
            self.state.processed_node_ids.push(node_id.clone());
        }
        let bucket = match outcome {
            NodeOutcome::Passed => None,
            NodeOutcome::Failed => Some(&mut self.state.failed_node_ids),
            NodeOutcome::Unverified => Some(&mut self.state.unverified_node_ids),
        };
        if let Some(ids) = bucket.filter(|ids| !ids.contains(&node_id)) {
            ids.push(node_id.clone());
        }
        retry::clear(&mut self.state);
        self.state.current_node_id = None;
        self.set_phase(Phase::Idle);
        self.save()?;

        let status_line = match (outcome, reason.as_deref()) {
            (NodeOutcome::Passed, _) => format!("PASSED: {node_id}\n"),
            (NodeOutcome::Unverified, _) => format!("DONE: {node_id} (tests not run)\n"),
            (NodeOutcome::Failed, Some(reason)) => format!("FAILED: {node_id}: {reason}\n"),
            (NodeOutcome::Failed, None) => format!("FAILED: {node_id}\n"),
        };
        if outcome == NodeOutcome::Failed {
            warn!(node = %node_id, reason = ?reason, "node failed");
        } else {
            info!(node = %node_id, ?outcome, "node finished");
        }
        self.channel.write_status(&status_line)?;
        self.events.emit(DriverEvent::NodeCompleted {
            node_id,
            outcome,
            reason,
        });

        match self.state.mode {
            RunMode::Backlog => self.advance(),
            RunMode::Single { .. } => self.complete_run(),
        }
    }

    fn complete_run(&mut self) -> Result<()> {
        let summary = run_summary(&self.state);
        self.state.run_status = RunStatus::Completed;
        self.state.current_node_id = None;
        self.set_phase(Phase::Done);
        self.channel.write_status(&format!("COMPLETE: {summary}\n"))?;
        self.channel.clear_state()?;
        info!(%summary, "run complete");
        self.events.emit(DriverEvent::RunCompleted { summary });
        Ok(())
    }

    /// Halt the run without touching persisted state, which stays resumable.
    fn fail_run(&mut self, err: &anyhow::Error) {
        let message = format!("{err:#}");
        error!(
            error = %message,
            phase = self.state.phase.as_str(),
            node = ?self.state.current_node_id,
            "run halted"
        );
        self.state.run_status = RunStatus::Error;
        self.emit_status();
        if let Err(status_err) = self.channel.write_status(&format!("ERROR: {message}\n")) {
            warn!(error = %format!("{status_err:#}"), "status write failed");
        }
        self.events.emit(DriverEvent::RunError { message });
    }

    /// Persist, write the request, then persist again with the dispatch recorded.
    fn dispatch(&mut self, request: &str) -> Result<()> {
        self.state.task_dispatched = false;
        self.save()?;
        self.channel.write_task(request)?;
        self.state.task_dispatched = true;
        self.save()?;
        self.events.emit(DriverEvent::TaskWritten {
            node_id: self.state.current_node_id.clone(),
            phase: self.state.phase,
        });
        Ok(())
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!(from = self.state.phase.as_str(), to = phase.as_str(), "phase transition");
        self.state.phase = phase;
        self.state.task_dispatched = false;
        self.emit_status();
    }

    fn emit_status(&mut self) {
        self.events.emit(DriverEvent::StatusChanged {
            run_status: self.state.run_status,
            phase: self.state.phase,
        });
    }

    fn save(&self) -> Result<()> {
        self.channel.save_state(&self.state).context("persist driver state")
    }

    fn current_node(&self) -> Result<(Workspace, WorkNode)> {
        let node_id = self
            .state
            .current_node_id
            .clone()
            .ok_or_else(|| anyhow!("no current node in phase {}", self.state.phase.as_str()))?;
        let workspace = self.deps.store.load()?;
        let node = workspace
            .node(&node_id)
            .cloned()
            .ok_or_else(|| anyhow!("node '{node_id}' not found in workspace"))?;
        Ok((workspace, node))
    }

    /// Spec file contents, if present and non-blank.
    fn read_spec(&self, node: &WorkNode) -> Option<String> {
        let path = self.root.join(node.paths(&self.config.layout).spec_file);
        fs::read_to_string(path)
            .ok()
            .filter(|text| !text.trim().is_empty())
    }
}

fn ensure_spec_stub(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, "").with_context(|| format!("create spec stub {}", path.display()))
}

fn unprocessed_work(workspace: &Workspace, processed: &[String]) -> usize {
    workspace
        .nodes
        .iter()
        .filter(|node| {
            node.is_work() && node.status != NodeStatus::Passed && !processed.contains(&node.key())
        })
        .count()
}
