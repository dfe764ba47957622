//! Prompt rendering.
//!
//! Templates live next to this module and are compiled into the binary. The
//! system prompt is re-rendered every turn so the oracle always sees the
//! current task list; it is never stored in the conversation.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::sandbox::Policy;
use crate::core::tasks::TaskList;
use crate::usecase::{Placement, PlanMode, RiskLevel, TestFramework};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const TESTWRITE_TEMPLATE: &str = include_str!("prompts/testwrite.md");
const ASK_TEMPLATE: &str = include_str!("prompts/ask.md");

/// Inputs for a planning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPrompt {
    pub objective: String,
    pub mode: PlanMode,
    pub risk: RiskLevel,
    pub depth: u32,
    pub context_files: Vec<String>,
}

/// Inputs for a test-writing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestWritePrompt {
    pub target: String,
    pub framework: TestFramework,
    pub placement: Placement,
    pub context_files: Vec<String>,
    pub writes: bool,
}

/// Per-turn facts for the system prompt.
pub struct SystemPrompt<'a> {
    pub policy: &'a Policy,
    pub tools: &'a [&'static str],
    pub tasks: &'a TaskList,
    pub max_tool_calls: u32,
    pub max_iterations: u32,
    pub iteration: u32,
}

pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("planner", PLANNER_TEMPLATE)
            .context("load planner template")?;
        env.add_template("testwrite", TESTWRITE_TEMPLATE)
            .context("load testwrite template")?;
        env.add_template("ask", ASK_TEMPLATE)
            .context("load ask template")?;
        Ok(Self { env })
    }

    pub fn render_system(&self, input: &SystemPrompt<'_>) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template.render(context! {
            root => input.policy.project_root().display().to_string(),
            mode => input.policy.mode().as_str(),
            writes => input.policy.missing_write_factors().is_empty(),
            tools => input.tools,
            tasks => input.tasks.to_markdown(),
            max_tool_calls => input.max_tool_calls,
            max_iterations => input.max_iterations,
            remaining => input.max_iterations.saturating_sub(input.iteration),
        })?;
        Ok(rendered)
    }

    pub fn render_plan(&self, input: &PlanPrompt) -> Result<String> {
        let template = self.env.get_template("planner")?;
        let rendered = template.render(context! {
            objective => input.objective.trim(),
            mode => input.mode.as_str(),
            risk => input.risk.as_str(),
            depth => input.depth,
            context_files => &input.context_files,
        })?;
        Ok(rendered)
    }

    pub fn render_testwrite(&self, input: &TestWritePrompt) -> Result<String> {
        let template = self.env.get_template("testwrite")?;
        let rendered = template.render(context! {
            target => input.target.trim(),
            framework => input.framework.as_str(),
            placement => input.placement.as_str(),
            context_files => &input.context_files,
            writes => input.writes,
        })?;
        Ok(rendered)
    }

    pub fn render_ask(&self, question: &str, context_files: &[String]) -> Result<String> {
        let template = self.env.get_template("ask")?;
        let rendered = template.render(context! {
            question => question.trim(),
            context_files => context_files,
        })?;
        Ok(rendered)
    }
}
