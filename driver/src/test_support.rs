//! Test-only helpers: deterministic nodes, scripted collaborators, and a
//! tempdir-backed harness around [`Driver`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::events::{DriverEvent, DriverObserver};
use crate::io::channel::ProtocolChannel;
use crate::io::config::DriverConfig;
use crate::io::init::{DriverPaths, InitOptions, init_workspace};
use crate::io::prompt::TemplateGenerator;
use crate::io::scaffold::FsScaffolder;
use crate::io::test_exec::TestExecutor;
use crate::io::workspace_store::{JsonNodeStore, NodeStore};
use crate::machine::{Collaborators, Driver};
use crate::workspace::{DependencyEdge, NodeKind, TestResult, WorkNode, Workspace};

/// Pending feature node titled after its id.
pub fn feature(id: &str) -> WorkNode {
    WorkNode::new(id, format!("{id} title"))
}

/// Grouping node that is never scheduled.
pub fn folder(id: &str) -> WorkNode {
    let mut node = feature(id);
    node.kind = NodeKind::Folder;
    node
}

/// Feature nodes where each depends on the one before it.
pub fn chain_workspace(ids: &[&str]) -> Workspace {
    let nodes = ids.iter().map(|id| feature(id)).collect();
    let edges = ids
        .windows(2)
        .map(|pair| DependencyEdge {
            source: pair[0].to_string(),
            target: pair[1].to_string(),
        })
        .collect();
    Workspace { nodes, edges }
}

pub fn passing(title: &str) -> TestResult {
    TestResult {
        title: title.to_string(),
        passed: true,
        error: None,
    }
}

pub fn failing(title: &str, error: &str) -> TestResult {
    TestResult {
        title: title.to_string(),
        passed: false,
        error: Some(error.to_string()),
    }
}

/// Test executor replaying queued outcomes; records the node id of each run.
#[derive(Clone, Default)]
pub struct ScriptedTests {
    queue: Rc<RefCell<VecDeque<Result<Vec<TestResult>, String>>>>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl ScriptedTests {
    pub fn push(&self, results: Vec<TestResult>) {
        self.queue.borrow_mut().push_back(Ok(results));
    }

    pub fn push_pass(&self) {
        self.push(vec![passing("works")]);
    }

    pub fn push_fail(&self, error: &str) {
        self.push(vec![passing("loads"), failing("works", error)]);
    }

    pub fn push_error(&self, message: &str) {
        self.queue.borrow_mut().push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl TestExecutor for ScriptedTests {
    fn run(&self, node: &WorkNode) -> Result<Vec<TestResult>> {
        self.calls.borrow_mut().push(node.id.clone());
        match self.queue.borrow_mut().pop_front() {
            Some(Ok(results)) => Ok(results),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted test outcome for {}", node.id)),
        }
    }
}

/// Observer keeping every emitted event.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<DriverEvent>>>,
}

impl EventRecorder {
    pub fn events(&self) -> Vec<DriverEvent> {
        self.events.borrow().clone()
    }

    /// Node ids in completion order.
    pub fn completed(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                DriverEvent::NodeCompleted { node_id, .. } => Some(node_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn tasks_written(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, DriverEvent::TaskWritten { .. }))
            .count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                DriverEvent::RunError { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl DriverObserver for EventRecorder {
    fn on_event(&mut self, event: &DriverEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Initialized workspace in a tempdir with scripted tests and an event recorder.
pub struct Harness {
    temp: TempDir,
    paths: DriverPaths,
    pub config: DriverConfig,
    pub tests: ScriptedTests,
    pub events: EventRecorder,
}

impl Harness {
    pub fn new(workspace: Workspace) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = init_workspace(temp.path(), &InitOptions { force: false })?;
        JsonNodeStore::new(&paths.workspace_path).save(&workspace)?;
        Ok(Self {
            temp,
            paths,
            config: DriverConfig::default(),
            tests: ScriptedTests::default(),
            events: EventRecorder::default(),
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> &DriverPaths {
        &self.paths
    }

    pub fn channel(&self) -> ProtocolChannel {
        ProtocolChannel::new(&self.paths)
    }

    /// Default collaborators except for the scripted test executor.
    pub fn collaborators(&self) -> Collaborators {
        let generator = TemplateGenerator::new(
            self.config.layout.clone(),
            ".tdd/workspace.json",
            ".tdd/channel/response.md",
        )
        .expect("bundled templates");
        Collaborators {
            store: Box::new(JsonNodeStore::new(&self.paths.workspace_path)),
            generator: Box::new(generator),
            tests: Box::new(self.tests.clone()),
            scaffolder: Box::new(FsScaffolder::new(self.root(), self.config.layout.clone())),
        }
    }

    /// Fresh driver over the on-disk state, as a new process would see it.
    pub fn driver(&self) -> Driver {
        let mut driver = Driver::open(&self.paths, self.config.clone(), self.collaborators());
        driver.subscribe(Box::new(self.events.clone()));
        driver
    }

    pub fn respond(&self, text: &str) {
        fs::write(&self.paths.response_path, text).expect("write response");
    }

    pub fn task(&self) -> String {
        fs::read_to_string(&self.paths.task_path).unwrap_or_default()
    }

    pub fn status(&self) -> String {
        fs::read_to_string(&self.paths.status_path).unwrap_or_default()
    }

    pub fn workspace(&self) -> Workspace {
        JsonNodeStore::new(&self.paths.workspace_path)
            .load()
            .expect("load workspace")
    }

    pub fn node(&self, id: &str) -> WorkNode {
        self.workspace().node(id).cloned().expect("node exists")
    }
}
