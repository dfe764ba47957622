//! Tools the oracle may call, and the registry that dispatches them.
//!
//! Tool names are parsed into [`ToolName`] at the boundary; anything else is an
//! `UnknownTool` failure. Every tool returns a [`ToolResult`]. Denials and
//! protocol errors are data for the oracle, never a reason to stop the run.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::blacklist::Blacklist;
use crate::core::sandbox::{DenyReason, Guard, Violation};
use crate::core::tasks::{TaskError, TaskList};

pub mod fs;
pub mod registry;
pub mod todo;

/// Closed set of tools this crate knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolName {
    Tree,
    ReadFile,
    WriteFile,
    TodoView,
    TodoAdd,
    TodoEdit,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::Tree,
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::TodoView,
        ToolName::TodoAdd,
        ToolName::TodoEdit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tree => "tree",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::TodoView => "todo_view",
            Self::TodoAdd => "todo_add",
            Self::TodoEdit => "todo_edit",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == raw)
            .ok_or_else(|| raw.to_string())
    }
}

/// Why a tool call did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolFailure {
    #[error("{operation} denied: {reason}")]
    Denied {
        reason: DenyReason,
        operation: String,
    },
    #[error("unknown tool `{name}`; available tools: {}", available.join(", "))]
    UnknownTool {
        name: String,
        available: Vec<String>,
    },
    #[error("invalid arguments for `{tool}`: {}", errors.join("; "))]
    InvalidArguments { tool: String, errors: Vec<String> },
    #[error("todo item #{number} not found")]
    UnknownOrdinal { number: u32 },
    #[error("todo text must not be empty")]
    EmptyText,
    #[error("provide `completed` or `text` to edit a todo item")]
    NothingToEdit,
    #[error("access to {path} is blocked: the path may contain sensitive information")]
    Blacklisted { path: String },
    #[error("{path} does not exist")]
    NotFound { path: String },
    #[error("{path} is not a directory")]
    NotADirectory { path: String },
    #[error("{path} is not a file")]
    NotAFile { path: String },
    #[error("{path} is too large ({size} bytes, limit {limit})")]
    TooLarge { path: String, size: u64, limit: u64 },
    #[error("{path} appears to be a binary file")]
    Binary { path: String },
    #[error("{path}: {message}")]
    Io { path: String, message: String },
}

impl ToolFailure {
    /// Guard denial carried by this failure, if any.
    pub fn denial(&self) -> Option<DenyReason> {
        match self {
            Self::Denied { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl From<Violation> for ToolFailure {
    fn from(violation: Violation) -> Self {
        Self::Denied {
            reason: violation.reason,
            operation: violation.operation,
        }
    }
}

impl From<TaskError> for ToolFailure {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::UnknownOrdinal(number) => Self::UnknownOrdinal { number },
            TaskError::EmptyText => Self::EmptyText,
            TaskError::NothingToEdit => Self::NothingToEdit,
        }
    }
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: ToolFailure) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn denial(&self) -> Option<DenyReason> {
        self.error.as_ref().and_then(ToolFailure::denial)
    }

    /// Text appended to the conversation as the tool message.
    pub fn to_content(&self, tool: &str) -> String {
        match (&self.error, &self.data) {
            (Some(err), _) => format!("Error: {err}"),
            (None, Some(Value::String(text))) => text.clone(),
            (None, Some(data)) if !data.is_null() => {
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
            }
            (None, _) => format!("{tool} executed successfully"),
        }
    }
}

impl From<Result<Value, ToolFailure>> for ToolResult {
    fn from(outcome: Result<Value, ToolFailure>) -> Self {
        match outcome {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failed(err),
        }
    }
}

/// Size limits applied by filesystem tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolLimits {
    pub max_file_bytes: u64,
    pub max_tree_entries: usize,
    pub default_tree_depth: u32,
    /// Guard-check writes but leave the filesystem untouched.
    pub dry_run_writes: bool,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            max_tree_entries: 2000,
            default_tree_depth: 3,
            dry_run_writes: false,
        }
    }
}

/// Run-scoped services shared by every tool call.
#[derive(Debug, Clone)]
pub struct ToolEnv {
    pub guard: Guard,
    pub blacklist: Blacklist,
    pub limits: ToolLimits,
}

/// What a single invocation may touch.
pub struct ToolContext<'a> {
    pub env: &'a ToolEnv,
    pub tasks: &'a mut TaskList,
    pub files_read: &'a mut BTreeSet<PathBuf>,
}

/// Deserialize already-validated arguments into a tool's argument struct.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    tool: ToolName,
    args: &Value,
) -> Result<T, ToolFailure> {
    serde_json::from_value(args.clone()).map_err(|err| ToolFailure::InvalidArguments {
        tool: tool.to_string(),
        errors: vec![err.to_string()],
    })
}
