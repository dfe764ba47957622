//! Test-only helpers: temporary projects, tool sessions and a scripted oracle.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::TempDir;

use crate::agent::oracle::{Oracle, OracleError, OracleRequest, OracleResponse, ToolCall};
use crate::agent::state::Message;
use crate::core::blacklist::Blacklist;
use crate::core::sandbox::{Guard, Policy, SandboxMode};
use crate::core::tasks::TaskList;
use crate::tools::{ToolContext, ToolEnv, ToolLimits};

/// A throwaway project root.
pub struct TestProject {
    dir: TempDir,
    root: PathBuf,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp project")?;
        let root = dir
            .path()
            .canonicalize()
            .context("canonicalize temp project")?;
        Ok(Self { dir, root })
    }

    /// Canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Tool session over this project: Limited mode when writes are allowed, Full otherwise.
    pub fn session(&self, allows_writes: bool, user_consent: bool) -> ToolSession {
        let mode = if allows_writes {
            SandboxMode::Limited
        } else {
            SandboxMode::Full
        };
        let policy = Policy::new(mode, self.dir.path(), allows_writes, user_consent)
            .expect("temp project root is a directory");
        ToolSession {
            env: ToolEnv {
                guard: Guard::new(policy),
                blacklist: Blacklist::builtin().expect("builtin blacklist"),
                limits: ToolLimits::default(),
            },
            tasks: TaskList::new(),
            files_read: BTreeSet::new(),
        }
    }
}

/// Owned state behind a [`ToolContext`].
pub struct ToolSession {
    pub env: ToolEnv,
    pub tasks: TaskList,
    pub files_read: BTreeSet<PathBuf>,
}

impl ToolSession {
    pub fn context(&mut self) -> ToolContext<'_> {
        ToolContext {
            env: &self.env,
            tasks: &mut self.tasks,
            files_read: &mut self.files_read,
        }
    }
}

/// Build a tool call with JSON-encoded arguments.
pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

/// What the oracle saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub conversation: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Oracle that replays queued responses, then falls back to `fallback`.
///
/// With no fallback an exhausted script is a transport error, so a runaway
/// loop shows up as a failed test instead of a hang.
#[derive(Default)]
pub struct ScriptedOracle {
    script: RefCell<VecDeque<Result<OracleResponse, OracleError>>>,
    fallback: Option<Result<OracleResponse, OracleError>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call with `response`.
    pub fn always(response: OracleResponse) -> Self {
        Self {
            fallback: Some(Ok(response)),
            ..Self::default()
        }
    }

    /// Request the same tool call on every turn.
    pub fn always_tool(name: &str, arguments: Value) -> Self {
        Self::always(OracleResponse::ToolCalls {
            content: String::new(),
            calls: vec![tool_call("call", name, arguments)],
        })
    }

    pub fn then_calls(self, calls: Vec<ToolCall>) -> Self {
        self.then(Ok(OracleResponse::ToolCalls {
            content: String::new(),
            calls,
        }))
    }

    pub fn then_final(self, content: &str) -> Self {
        self.then(Ok(OracleResponse::Final {
            content: content.to_string(),
        }))
    }

    pub fn then_error(self, error: OracleError) -> Self {
        self.then(Err(error))
    }

    fn then(self, step: Result<OracleResponse, OracleError>) -> Self {
        self.script.borrow_mut().push_back(step);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn respond(&self, request: &OracleRequest<'_>) -> Result<OracleResponse, OracleError> {
        let tool_names = request
            .tools
            .iter()
            .filter_map(|tool| tool["function"]["name"].as_str())
            .map(str::to_string)
            .collect();
        self.requests.borrow_mut().push(RecordedRequest {
            system: request.system.to_string(),
            conversation: request.conversation.to_vec(),
            tool_names,
        });
        if let Some(step) = self.script.borrow_mut().pop_front() {
            return step;
        }
        match &self.fallback {
            Some(step) => step.clone(),
            None => Err(OracleError::Transport("script exhausted".to_string())),
        }
    }
}
