//! Orchestration for one agent run: config and use case in, report out.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agent::engine::{Engine, EngineConfig};
use crate::agent::oracle::Oracle;
use crate::agent::prompt::{PlanPrompt, PromptEngine, TestWritePrompt};
use crate::agent::state::Termination;
use crate::cancel::CancelToken;
use crate::core::blacklist::Blacklist;
use crate::core::sandbox::Guard;
use crate::io::config::AgentConfig;
use crate::report::RunReport;
use crate::tools::{ToolEnv, ToolLimits};
use crate::usecase::{ASK, TESTWRITE, UseCase};

/// What the operator asked for. Each variant maps to exactly one use case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRequest {
    Ask {
        question: String,
        context_files: Vec<String>,
    },
    Plan(PlanPrompt),
    TestWrite(TestWritePrompt),
}

impl RunRequest {
    pub fn use_case(&self) -> &'static UseCase {
        match self {
            Self::Ask { .. } => &ASK,
            Self::Plan(plan) => plan.mode.use_case(),
            Self::TestWrite(_) => &TESTWRITE,
        }
    }

    /// The operator's objective as shown in the report.
    pub fn objective(&self) -> &str {
        match self {
            Self::Ask { question, .. } => question,
            Self::Plan(plan) => &plan.objective,
            Self::TestWrite(testwrite) => &testwrite.target,
        }
    }

    fn context_files_mut(&mut self) -> &mut Vec<String> {
        match self {
            Self::Ask { context_files, .. } => context_files,
            Self::Plan(plan) => &mut plan.context_files,
            Self::TestWrite(testwrite) => &mut testwrite.context_files,
        }
    }

    fn render(&self, prompts: &PromptEngine) -> Result<String> {
        match self {
            Self::Ask {
                question,
                context_files,
            } => prompts.render_ask(question, context_files),
            Self::Plan(plan) => prompts.render_plan(plan),
            Self::TestWrite(testwrite) => prompts.render_testwrite(testwrite),
        }
    }
}

/// Per-invocation overrides on top of the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub max_iterations: Option<u32>,
    pub depth: Option<u32>,
    /// The operator passed `--write`.
    pub user_consent: bool,
    pub dry_run: bool,
}

/// Run one use case to termination against `oracle`.
///
/// Errors are setup failures (bad root, config or template). Everything that
/// happens once the loop starts is reported through the returned [`Termination`].
#[instrument(skip_all, fields(use_case = request.use_case().id))]
pub fn run_use_case<O: Oracle>(
    root: &Path,
    mut request: RunRequest,
    cfg: &AgentConfig,
    options: &RunOptions,
    oracle: &O,
    cancel: &CancelToken,
) -> Result<(RunReport, Termination)> {
    let use_case = request.use_case();
    let policy = use_case
        .policy(root, options.user_consent)
        .context("build sandbox policy")?;
    let guard = Guard::new(policy);
    let root = guard.root().to_path_buf();

    let context_files = request.context_files_mut();
    if context_files.is_empty() {
        context_files.extend(
            use_case
                .default_context
                .iter()
                .filter(|name| root.join(name).is_file())
                .map(|name| name.to_string()),
        );
    }

    let blacklist = Blacklist::new(&cfg.blacklist.extra_patterns, &cfg.blacklist.extra_ignores)
        .context("compile blacklist patterns")?;
    let limits = ToolLimits {
        max_file_bytes: cfg.limits.max_file_bytes,
        max_tree_entries: cfg.limits.max_tree_entries,
        default_tree_depth: options.depth.unwrap_or(cfg.run.exploration_depth),
        dry_run_writes: options.dry_run,
    };
    let env = ToolEnv {
        guard,
        blacklist,
        limits,
    };

    let mut config = EngineConfig::from_config(cfg);
    if let Some(max_iterations) = options.max_iterations {
        config.max_iterations = max_iterations;
    }

    let registry = use_case.registry().context("register tools")?;
    let prompt = request
        .render(&PromptEngine::new()?)
        .context("render user prompt")?;

    info!(root = %root.display(), writes = options.user_consent, "running use case");
    let mut engine = Engine::new(oracle, registry, env, config)?;
    let outcome = engine.run(&prompt, cancel);

    let report = RunReport::from_outcome(use_case.id, request.objective(), &root, &outcome);
    Ok((report, outcome.termination))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::{ScriptedOracle, TestProject, tool_call};
    use crate::usecase::{Placement, PlanMode, RiskLevel, TestFramework};

    fn plan(mode: PlanMode) -> RunRequest {
        RunRequest::Plan(PlanPrompt {
            objective: "add caching".to_string(),
            mode,
            risk: RiskLevel::Moderate,
            depth: 2,
            context_files: Vec::new(),
        })
    }

    #[test]
    fn plan_run_records_todos_and_default_context() {
        let project = TestProject::new().expect("project");
        project.write("README.md", "# demo").expect("write");
        let oracle = ScriptedOracle::new()
            .then_calls(vec![
                tool_call("c1", "read_file", json!({"path": "README.md"})),
                tool_call("c2", "todo_add", json!({"text": "profile queries"})),
            ])
            .then_final("Plan ready.");

        let (report, termination) = run_use_case(
            project.root(),
            plan(PlanMode::Plan),
            &AgentConfig::default(),
            &RunOptions::default(),
            &oracle,
            &CancelToken::new(),
        )
        .expect("run");

        assert_eq!(termination, Termination::Completed);
        assert_eq!(report.use_case, "task");
        assert_eq!(report.files_explored, vec!["README.md".to_string()]);
        assert_eq!(report.todo_stats.total_items, 1);
        assert_eq!(report.agent_reasoning, "Plan ready.");

        let first = &oracle.requests()[0];
        assert!(first.conversation[0].content.contains("README.md"));
        assert!(!first.tool_names.contains(&"write_file".to_string()));
    }

    #[test]
    fn testwrite_without_consent_is_denied_but_keeps_going() {
        let project = TestProject::new().expect("project");
        let oracle = ScriptedOracle::new()
            .then_calls(vec![tool_call(
                "c1",
                "write_file",
                json!({"path": "tests/test_a.py", "content": "", "action": "create"}),
            )])
            .then_final("Could not write.");
        let request = RunRequest::TestWrite(TestWritePrompt {
            target: "a.py".to_string(),
            framework: TestFramework::Pytest,
            placement: Placement::NewFile,
            context_files: Vec::new(),
            writes: false,
        });

        let (report, termination) = run_use_case(
            project.root(),
            request,
            &AgentConfig::default(),
            &RunOptions::default(),
            &oracle,
            &CancelToken::new(),
        )
        .expect("run");

        assert_eq!(termination, Termination::Completed);
        assert_eq!(report.use_case, "testwrite");
        assert!(!project.root().join("tests/test_a.py").exists());
        let tool_message = &oracle.requests()[1].conversation[2];
        assert!(tool_message.content.contains("consent"));
    }

    #[test]
    fn iteration_override_applies() {
        let project = TestProject::new().expect("project");
        let oracle = ScriptedOracle::always_tool("todo_view", json!({}));
        let options = RunOptions {
            max_iterations: Some(2),
            ..RunOptions::default()
        };

        let (report, termination) = run_use_case(
            project.root(),
            plan(PlanMode::ExplorePlan),
            &AgentConfig::default(),
            &options,
            &oracle,
            &CancelToken::new(),
        )
        .expect("run");

        assert_eq!(termination, Termination::IterationLimitReached);
        assert_eq!(report.use_case, "agentic_task");
        assert_eq!(report.iterations_used, 2);
        assert_eq!(oracle.calls(), 2);
    }

    #[test]
    fn missing_root_is_a_setup_error() {
        let project = TestProject::new().expect("project");
        let oracle = ScriptedOracle::new();
        let err = run_use_case(
            &project.root().join("missing"),
            plan(PlanMode::Plan),
            &AgentConfig::default(),
            &RunOptions::default(),
            &oracle,
            &CancelToken::new(),
        )
        .expect_err("missing root");
        assert!(format!("{err:#}").contains("sandbox policy"));
        assert_eq!(oracle.calls(), 0);
    }
}
