//! Dependency wiring and skeleton file creation for the scaffold phase.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::selector::DependencyRef;
use crate::io::config::LayoutConfig;
use crate::workspace::{NodeStatus, WorkNode, Workspace};

/// What a node needs to know about one of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WiringEntry {
    pub id: String,
    pub title: String,
    pub workflow: Option<String>,
    pub status: NodeStatus,
    pub spec_file: PathBuf,
    pub action_file: PathBuf,
}

/// Resolve `node`'s dependency ids to wiring entries, in dependency order.
///
/// Ids that match no node are skipped.
pub fn dependency_wiring(
    workspace: &Workspace,
    node: &WorkNode,
    layout: &LayoutConfig,
) -> Vec<WiringEntry> {
    workspace
        .dependency_ids(node)
        .iter()
        .filter_map(|raw| {
            let dep = DependencyRef::parse(raw);
            workspace.nodes.iter().find(|candidate| dep.matches(candidate))
        })
        .map(|dep| {
            let paths = dep.paths(layout);
            WiringEntry {
                id: dep.id.clone(),
                title: dep.title.clone(),
                workflow: dep.workflow.clone(),
                status: dep.status,
                spec_file: paths.spec_file,
                action_file: paths.action_file,
            }
        })
        .collect()
}

/// Skeleton creation collaborator. Must never overwrite existing files.
pub trait Scaffolder {
    /// Returns the files that were created.
    fn ensure_skeleton(
        &self,
        node: &WorkNode,
        wiring: &[WiringEntry],
        spec: Option<&str>,
    ) -> Result<Vec<PathBuf>>;
}

/// Writes comment-only skeletons under the workspace root.
#[derive(Debug, Clone)]
pub struct FsScaffolder {
    root: PathBuf,
    layout: LayoutConfig,
}

impl FsScaffolder {
    pub fn new(root: impl Into<PathBuf>, layout: LayoutConfig) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    fn header(&self, node: &WorkNode, wiring: &[WiringEntry], kind: &str) -> String {
        let prefix = &self.layout.comment_prefix;
        let mut buf = format!("{prefix} {kind} for {}: {}\n", node.id, node.title);
        for dep in wiring {
            buf.push_str(&format!(
                "{prefix} depends on {} ({})\n",
                dep.id,
                dep.action_file.display()
            ));
        }
        buf
    }
}

impl Scaffolder for FsScaffolder {
    fn ensure_skeleton(
        &self,
        node: &WorkNode,
        wiring: &[WiringEntry],
        spec: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let paths = node.paths(&self.layout);
        let mut created = Vec::new();

        let action = self.header(node, wiring, "implementation");
        if create_if_absent(&self.root.join(&paths.action_file), &action)? {
            created.push(paths.action_file.clone());
        }

        let mut test = self.header(node, wiring, "tests");
        if let Some(spec) = spec {
            let prefix = &self.layout.comment_prefix;
            let scenarios = spec
                .lines()
                .map(str::trim)
                .filter(|line| line.starts_with("Scenario"))
                .collect::<Vec<_>>();
            for scenario in scenarios {
                test.push_str(&format!("{prefix} {scenario}\n"));
            }
        }
        if create_if_absent(&self.root.join(&paths.test_file), &test)? {
            created.push(paths.test_file);
        }

        debug!(node = %node.id, created = created.len(), "skeleton ensured");
        Ok(created)
    }
}

fn create_if_absent(path: &Path, contents: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write skeleton {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::chain_workspace;

    #[test]
    fn wiring_follows_edges_and_skips_unknown_ids() {
        let mut workspace = chain_workspace(&["a", "b"]);
        workspace.nodes[1].cross_dependencies = vec!["ghost".to_string()];
        let b = workspace.nodes[1].clone();
        let wiring = dependency_wiring(&workspace, &b, &LayoutConfig::default());
        assert_eq!(wiring.len(), 1);
        assert_eq!(wiring[0].id, "a");
        assert_eq!(wiring[0].action_file, PathBuf::from("src/actions/a.rs"));
    }

    #[test]
    fn skeleton_is_created_once_and_never_overwritten() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scaffolder = FsScaffolder::new(temp.path(), LayoutConfig::default());
        let workspace = chain_workspace(&["a", "b"]);
        let b = workspace.nodes[1].clone();
        let wiring = dependency_wiring(&workspace, &b, &LayoutConfig::default());

        let created = scaffolder
            .ensure_skeleton(&b, &wiring, Some("Feature: B\n  Scenario: works\n"))
            .expect("scaffold");
        assert_eq!(
            created,
            vec![PathBuf::from("src/actions/b.rs"), PathBuf::from("tests/b.rs")]
        );
        let test_body = fs::read_to_string(temp.path().join("tests/b.rs")).expect("read");
        assert!(test_body.contains("depends on a"));
        assert!(test_body.contains("// Scenario: works"));

        fs::write(temp.path().join("tests/b.rs"), "real tests").expect("write");
        let again = scaffolder.ensure_skeleton(&b, &wiring, None).expect("scaffold");
        assert!(again.is_empty());
        assert_eq!(
            fs::read_to_string(temp.path().join("tests/b.rs")).expect("read"),
            "real tests"
        );
    }
}
