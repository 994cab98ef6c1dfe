//! Node and edge records owned by the workspace store.
//!
//! The driver annotates nodes in place (status, cached test results) but never
//! removes them. Storage format is the store's concern, see
//! [`crate::io::workspace_store`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::selector::DependencyRef;
use crate::io::config::LayoutConfig;

/// Whether a node is a unit of work or only groups other nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Feature,
    Folder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Pending,
    Passed,
    Failed,
}

/// One executed test as reported by the test collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub title: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkNode {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub status: NodeStatus,
    /// Explicit dependency ids on top of edges, optionally `workflow/id`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cross_dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test_results: Option<Vec<TestResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Workspace-relative files belonging to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePaths {
    pub spec_file: PathBuf,
    pub action_file: PathBuf,
    pub test_file: PathBuf,
}

impl WorkNode {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            workflow: None,
            kind: NodeKind::Feature,
            status: NodeStatus::Pending,
            cross_dependencies: Vec::new(),
            spec_file: None,
            action_file: None,
            test_file: None,
            last_test_results: None,
            failure_reason: None,
        }
    }

    /// Identity within a run: `workflow/id` when the node belongs to a
    /// workflow, the bare id otherwise.
    pub fn key(&self) -> String {
        match &self.workflow {
            Some(workflow) => format!("{workflow}/{}", self.id),
            None => self.id.clone(),
        }
    }

    pub fn is_work(&self) -> bool {
        self.kind == NodeKind::Feature
    }

    /// Resolve node files: explicit paths win, otherwise derive from the layout.
    pub fn paths(&self, layout: &LayoutConfig) -> NodePaths {
        let derive = |dir: &str, ext: &str| {
            let mut path = PathBuf::from(dir);
            if let Some(workflow) = &self.workflow {
                path.push(workflow);
            }
            path.push(format!("{}.{}", self.id, ext));
            path
        };
        NodePaths {
            spec_file: self
                .spec_file
                .clone()
                .unwrap_or_else(|| derive(&layout.spec_dir, &layout.spec_ext)),
            action_file: self
                .action_file
                .clone()
                .unwrap_or_else(|| derive(&layout.action_dir, &layout.action_ext)),
            test_file: self
                .test_file
                .clone()
                .unwrap_or_else(|| derive(&layout.test_dir, &layout.test_ext)),
        }
    }
}

/// `target` depends on `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub nodes: Vec<WorkNode>,
    #[serde(default)]
    pub edges: Vec<DependencyEdge>,
}

impl Workspace {
    /// Look a node up by key (`workflow/id`) or bare id. A bare id matches
    /// the first node carrying it, whatever its workflow.
    pub fn node(&self, key: &str) -> Option<&WorkNode> {
        self.position(key).map(|index| &self.nodes[index])
    }

    pub fn node_mut(&mut self, key: &str) -> Option<&mut WorkNode> {
        self.position(key).map(|index| &mut self.nodes[index])
    }

    fn position(&self, key: &str) -> Option<usize> {
        let reference = DependencyRef::parse(key);
        self.nodes
            .iter()
            .position(|node| reference.matches(node))
            .or_else(|| self.nodes.iter().position(|node| node.id == key))
    }

    pub fn work_node_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_work()).count()
    }

    /// Edge sources targeting `node`, then its explicit cross dependencies.
    pub fn dependency_ids(&self, node: &WorkNode) -> Vec<String> {
        let mut ids: Vec<String> = self
            .edges
            .iter()
            .filter(|edge| edge.target == node.id)
            .map(|edge| edge.source.clone())
            .collect();
        ids.extend(node.cross_dependencies.iter().cloned());
        ids
    }
}
