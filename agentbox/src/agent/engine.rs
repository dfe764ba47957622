//! The bounded agent loop.
//!
//! One turn: check cancellation and the iteration budget, render the system
//! prompt, ask the oracle, then either finish (final answer) or dispatch every
//! requested tool call in order and fold the results into [`AgentState`].
//!
//! The iteration budget is checked before every oracle round-trip, so a run
//! makes at most `max_iterations + 1` oracle calls whatever the oracle does.
//! Tool failures, guard denials included, are appended as tool messages and
//! the loop carries on. Only the oracle failing, the budget running out,
//! cancellation, or an opt-in denial streak limit end a run early.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::agent::oracle::{Oracle, OracleRequest, OracleResponse};
use crate::agent::prompt::{PromptEngine, SystemPrompt};
use crate::agent::state::{AgentState, Message, Termination};
use crate::cancel::CancelToken;
use crate::io::config::AgentConfig;
use crate::tools::registry::ToolRegistry;
use crate::tools::{ToolContext, ToolEnv};

/// Loop bounds, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_iterations: u32,
    /// End the run after this many consecutive guard denials. `None`: never.
    pub max_consecutive_denials: Option<u32>,
    pub oracle_timeout: Duration,
    pub max_tokens: u32,
    pub max_tool_calls: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_consecutive_denials: None,
            oracle_timeout: Duration::from_secs(120),
            max_tokens: 2000,
            max_tool_calls: 5,
        }
    }
}

impl EngineConfig {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self {
            max_iterations: cfg.run.max_iterations,
            max_consecutive_denials: cfg.run.max_consecutive_denials,
            oracle_timeout: Duration::from_secs(cfg.oracle.timeout_secs),
            max_tokens: cfg.oracle.max_tokens,
            max_tool_calls: cfg.run.max_tool_calls_per_turn,
        }
    }
}

/// Where the loop is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Running,
    AwaitingOracle,
    Terminated(Termination),
}

/// Result of [`Engine::run`]: the reason plus the final, read-only state.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub termination: Termination,
    pub state: AgentState,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.termination == Termination::Completed
    }

    /// The oracle's closing answer, present only for completed runs.
    pub fn final_answer(&self) -> Option<&str> {
        if self.is_success() {
            self.state.last_assistant_text()
        } else {
            None
        }
    }

    pub fn summary(&self) -> String {
        let iterations = self.state.iteration();
        let files = self.state.files_read().len();
        let mut summary = match &self.termination {
            Termination::Completed => format!(
                "Completed successfully in {iterations} iterations, explored {files} files"
            ),
            other => format!("Stopped after {iterations} iterations ({other}), explored {files} files"),
        };
        if !self.state.tasks().is_empty() {
            summary.push_str(", created todo plan");
        }
        summary
    }
}

pub struct Engine<'o, O: Oracle> {
    oracle: &'o O,
    registry: ToolRegistry,
    env: ToolEnv,
    config: EngineConfig,
    prompts: PromptEngine,
    tool_schemas: Vec<Value>,
    state: AgentState,
    phase: EngineState,
    denial_streak: u32,
}

impl<'o, O: Oracle> Engine<'o, O> {
    pub fn new(
        oracle: &'o O,
        registry: ToolRegistry,
        env: ToolEnv,
        config: EngineConfig,
    ) -> Result<Self> {
        let prompts = PromptEngine::new().context("build prompt templates")?;
        let tool_schemas = registry.schema_for_oracle();
        Ok(Self {
            oracle,
            registry,
            env,
            config,
            prompts,
            tool_schemas,
            state: AgentState::new(),
            phase: EngineState::Running,
            denial_streak: 0,
        })
    }

    pub fn phase(&self) -> &EngineState {
        &self.phase
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Drive the loop to termination, starting from `prompt` as the first user message.
    ///
    /// An engine runs once. Calling this again on a terminated engine returns
    /// the recorded outcome without contacting the oracle.
    #[instrument(skip_all, fields(max_iterations = self.config.max_iterations, tools = self.tool_schemas.len()))]
    pub fn run(&mut self, prompt: &str, cancel: &CancelToken) -> RunOutcome {
        if let EngineState::Terminated(reason) = &self.phase {
            warn!("engine already terminated; returning recorded outcome");
            return RunOutcome {
                termination: reason.clone(),
                state: self.state.clone(),
                elapsed: Duration::ZERO,
            };
        }
        let started = Instant::now();
        info!(root = %self.env.guard.root().display(), "starting agent run");
        self.state.push(Message::user(prompt));

        let termination = loop {
            if let Some(reason) = self.turn(cancel) {
                break reason;
            }
        };

        self.state.terminate(termination.clone());
        self.phase = EngineState::Terminated(termination.clone());
        info!(
            reason = termination.code(),
            iterations = self.state.iteration(),
            files_read = self.state.files_read().len(),
            "agent run finished"
        );
        RunOutcome {
            termination,
            state: self.state.clone(),
            elapsed: started.elapsed(),
        }
    }

    /// One turn. Returns the termination reason when the loop must stop.
    #[instrument(skip_all, fields(iteration = self.state.iteration()))]
    fn turn(&mut self, cancel: &CancelToken) -> Option<Termination> {
        if cancel.is_cancelled() {
            warn!("run cancelled by operator");
            return Some(Termination::Cancelled);
        }
        if self.state.iteration() >= self.config.max_iterations {
            return Some(Termination::IterationLimitReached);
        }

        let tool_names = self.registry.names();
        let system = match self.prompts.render_system(&SystemPrompt {
            policy: self.env.guard.policy(),
            tools: &tool_names,
            tasks: self.state.tasks(),
            max_tool_calls: self.config.max_tool_calls,
            max_iterations: self.config.max_iterations,
            iteration: self.state.iteration(),
        }) {
            Ok(system) => system,
            Err(err) => {
                let message = format!("render system prompt: {err:#}");
                self.state.push(Message::system(message.clone()));
                return Some(Termination::OracleError(message));
            }
        };

        self.phase = EngineState::AwaitingOracle;
        let request = OracleRequest {
            system: &system,
            conversation: self.state.conversation(),
            tools: &self.tool_schemas,
            max_tokens: self.config.max_tokens,
            timeout: self.config.oracle_timeout,
            max_tool_calls: self.config.max_tool_calls,
        };
        let response = self.oracle.respond(&request);
        self.phase = EngineState::Running;

        match response {
            Err(err) => {
                warn!(error = %err, "oracle request failed");
                self.state.push(Message::system(format!("oracle error: {err}")));
                Some(Termination::OracleError(err.to_string()))
            }
            Ok(OracleResponse::Final { content }) => {
                debug!(chars = content.len(), "oracle returned a final answer");
                self.state.push(Message::assistant(content, Vec::new()));
                Some(Termination::Completed)
            }
            Ok(OracleResponse::ToolCalls { content, calls }) => {
                if calls.len() > self.config.max_tool_calls as usize {
                    debug!(
                        requested = calls.len(),
                        advised = self.config.max_tool_calls,
                        "oracle exceeded advised tool calls per turn"
                    );
                }
                self.state.push(Message::assistant(content, calls.clone()));
                for call in &calls {
                    let mut ctx = ToolContext {
                        env: &self.env,
                        tasks: &mut self.state.tasks,
                        files_read: &mut self.state.files_read,
                    };
                    let result = self.registry.dispatch_raw(&call.name, &call.arguments, &mut ctx);
                    match result.denial() {
                        Some(reason) => {
                            self.denial_streak += 1;
                            info!(tool = %call.name, reason = reason.code(), "tool call denied");
                        }
                        None => self.denial_streak = 0,
                    }
                    debug!(tool = %call.name, success = result.success, "dispatched tool call");
                    self.state
                        .push(Message::tool(call.id.clone(), result.to_content(&call.name)));
                }
                self.state.iteration += 1;

                match self.config.max_consecutive_denials {
                    Some(limit) if self.denial_streak >= limit => {
                        warn!(streak = self.denial_streak, "denial streak limit reached");
                        Some(Termination::PolicyViolation {
                            consecutive_denials: self.denial_streak,
                        })
                    }
                    _ => None,
                }
            }
        }
    }
}
