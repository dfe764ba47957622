//! Run reports for the CLI: one serializable record per finished run.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::agent::engine::RunOutcome;
use crate::core::path::display_relative;
use crate::core::tasks::TaskStats;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub use_case: String,
    pub objective: String,
    pub success: bool,
    pub termination: String,
    pub iterations_used: u32,
    pub summary: String,
    pub plan: String,
    pub todo_stats: TaskStats,
    pub exploration_summary: String,
    pub files_explored: Vec<String>,
    /// The oracle's closing answer; empty unless the run completed.
    pub agent_reasoning: String,
}

impl RunReport {
    pub fn from_outcome(use_case: &str, objective: &str, root: &Path, outcome: &RunOutcome) -> Self {
        let state = &outcome.state;
        let files_explored: Vec<String> = state
            .files_read()
            .iter()
            .map(|path| display_relative(root, path))
            .collect();
        Self {
            use_case: use_case.to_string(),
            objective: objective.trim().to_string(),
            success: outcome.is_success(),
            termination: outcome.termination.code().to_string(),
            iterations_used: state.iteration(),
            summary: outcome.summary(),
            plan: state.tasks().to_markdown(),
            todo_stats: state.tasks().stats(),
            exploration_summary: exploration_summary(&files_explored),
            files_explored,
            agent_reasoning: outcome.final_answer().unwrap_or_default().to_string(),
        }
    }

    /// Human-readable rendering for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let status = if self.success { "ok" } else { "stopped" };
        let _ = writeln!(out, "[{}] {} ({status})", self.use_case, self.objective);
        let _ = writeln!(out, "{}", self.summary);
        let _ = writeln!(out, "{}", self.exploration_summary);
        if self.todo_stats.total_items > 0 {
            let _ = writeln!(
                out,
                "\nPlan ({}/{} done):\n{}",
                self.todo_stats.completed_items, self.todo_stats.total_items, self.plan
            );
        }
        if !self.agent_reasoning.is_empty() {
            let _ = writeln!(out, "\n{}", self.agent_reasoning.trim_end());
        }
        out
    }
}

fn exploration_summary(files: &[String]) -> String {
    match files {
        [] => "No files explored".to_string(),
        [only] => format!("Explored 1 file: {only}"),
        many => format!("Explored {} files", many.len()),
    }
}
