//! Deterministic, dependency-respecting node selection.

use crate::workspace::{NodeStatus, WorkNode, Workspace};

/// A dependency id, optionally qualified with its originating workflow
/// (`workflow/nodeId`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef<'a> {
    pub workflow: Option<&'a str>,
    pub node_id: &'a str,
}

impl<'a> DependencyRef<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw.split_once('/') {
            Some((workflow, node_id)) if !workflow.is_empty() && !node_id.is_empty() => Self {
                workflow: Some(workflow),
                node_id,
            },
            _ => Self {
                workflow: None,
                node_id: raw,
            },
        }
    }

    /// Matches on id, and on workflow when the reference carries one.
    pub fn matches(&self, node: &WorkNode) -> bool {
        if node.id != self.node_id {
            return false;
        }
        match self.workflow {
            Some(workflow) => node.workflow.as_deref() == Some(workflow),
            None => true,
        }
    }
}

/// Pick the first work node, in stable input order, that is neither passed nor
/// processed and whose dependencies are all passed or processed.
///
/// `processed` holds node keys (see [`WorkNode::key`]).
///
/// Returns `None` when nothing is eligible, which is the run's completion
/// signal. Cyclic graphs starve rather than error.
pub fn select_next<'a>(workspace: &'a Workspace, processed: &[String]) -> Option<&'a WorkNode> {
    workspace.nodes.iter().find(|node| {
        node.is_work()
            && node.status != NodeStatus::Passed
            && !processed.contains(&node.key())
            && dependencies_satisfied(workspace, node, processed)
    })
}

pub fn dependencies_satisfied(workspace: &Workspace, node: &WorkNode, processed: &[String]) -> bool {
    workspace
        .dependency_ids(node)
        .iter()
        .all(|raw| is_satisfied(workspace, &DependencyRef::parse(raw), processed))
}

fn is_satisfied(workspace: &Workspace, dep: &DependencyRef<'_>, processed: &[String]) -> bool {
    workspace.nodes.iter().any(|candidate| {
        dep.matches(candidate)
            && (candidate.status == NodeStatus::Passed || processed.contains(&candidate.key()))
    })
}
