//! Task text generation for each agent-facing phase.
//!
//! The driver treats generated text as opaque and embeds it verbatim in the
//! request artifact; see [`compose_request`] for the framing it adds.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::retry::render_attempts;
use crate::core::types::FixAttempt;
use crate::io::config::LayoutConfig;
use crate::io::scaffold::WiringEntry;
use crate::workspace::{TestResult, WorkNode};

const BLUEPRINT_TEMPLATE: &str = include_str!("prompts/blueprint.md");
const BDD_TEMPLATE: &str = include_str!("prompts/bdd.md");
const IMPLEMENT_TEMPLATE: &str = include_str!("prompts/implement.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");

/// Text generation collaborator. Implementations should be pure functions of
/// their inputs.
pub trait TextGenerator {
    fn blueprint_task(&self) -> Result<String>;

    fn bdd_task(&self, node: &WorkNode, dependencies: &[WiringEntry]) -> Result<String>;

    fn implement_task(
        &self,
        node: &WorkNode,
        spec: Option<&str>,
        dependencies: &[WiringEntry],
    ) -> Result<String>;

    /// Diagnostic packet plus instructions for one fix cycle.
    fn fix_task(
        &self,
        node: &WorkNode,
        results: &[TestResult],
        previous_attempts: &[FixAttempt],
        retry: u32,
    ) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
struct PathsContext {
    spec_file: String,
    action_file: String,
    test_file: String,
}

impl PathsContext {
    fn for_node(node: &WorkNode, layout: &LayoutConfig) -> Self {
        let paths = node.paths(layout);
        Self {
            spec_file: paths.spec_file.display().to_string(),
            action_file: paths.action_file.display().to_string(),
            test_file: paths.test_file.display().to_string(),
        }
    }
}

/// Default generator rendering the bundled minijinja templates.
pub struct TemplateGenerator {
    env: Environment<'static>,
    layout: LayoutConfig,
    workspace_file: String,
    response_file: String,
}

impl TemplateGenerator {
    pub fn new(layout: LayoutConfig, workspace_file: &str, response_file: &str) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("blueprint", BLUEPRINT_TEMPLATE)
            .context("load blueprint template")?;
        env.add_template("bdd", BDD_TEMPLATE)
            .context("load bdd template")?;
        env.add_template("implement", IMPLEMENT_TEMPLATE)
            .context("load implement template")?;
        env.add_template("fix", FIX_TEMPLATE)
            .context("load fix template")?;
        Ok(Self {
            env,
            layout,
            workspace_file: workspace_file.to_string(),
            response_file: response_file.to_string(),
        })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} template"))?;
        Ok(rendered.trim().to_string())
    }
}

impl TextGenerator for TemplateGenerator {
    fn blueprint_task(&self) -> Result<String> {
        self.render(
            "blueprint",
            context! {
                workspace_file => &self.workspace_file,
                response_file => &self.response_file,
            },
        )
    }

    fn bdd_task(&self, node: &WorkNode, dependencies: &[WiringEntry]) -> Result<String> {
        self.render(
            "bdd",
            context! {
                node => node,
                paths => PathsContext::for_node(node, &self.layout),
                dependencies => dependencies,
                response_file => &self.response_file,
            },
        )
    }

    fn implement_task(
        &self,
        node: &WorkNode,
        spec: Option<&str>,
        dependencies: &[WiringEntry],
    ) -> Result<String> {
        self.render(
            "implement",
            context! {
                node => node,
                paths => PathsContext::for_node(node, &self.layout),
                has_spec => spec.is_some(),
                dependencies => dependencies,
                response_file => &self.response_file,
            },
        )
    }

    fn fix_task(
        &self,
        node: &WorkNode,
        results: &[TestResult],
        previous_attempts: &[FixAttempt],
        retry: u32,
    ) -> Result<String> {
        let attempts = render_attempts(previous_attempts);
        self.render(
            "fix",
            context! {
                node => node,
                paths => PathsContext::for_node(node, &self.layout),
                results => results,
                attempts => (!attempts.is_empty()).then_some(attempts),
                retry => retry,
                response_file => &self.response_file,
            },
        )
    }
}

/// Frame a generated body as a request: optional spec block first, then the
/// body, then a `Retry: n/max` footer for fix requests.
pub fn compose_request(spec: Option<&str>, body: &str, retry: Option<(u32, u32)>) -> String {
    let mut sections = Vec::new();
    if let Some(spec) = spec.map(str::trim).filter(|s| !s.is_empty()) {
        sections.push(format!("## Specification\n\n{spec}"));
    }
    sections.push(body.trim().to_string());
    if let Some((current, max)) = retry {
        sections.push(format!("Retry: {current}/{max}"));
    }
    let mut request = sections.join("\n\n");
    request.push('\n');
    request
}
