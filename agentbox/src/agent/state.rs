//! Run-scoped agent state.
//!
//! One [`AgentState`] belongs to one engine run. The engine mutates it turn by
//! turn; once a termination reason is recorded it is only ever read.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::agent::oracle::ToolCall;
use crate::core::tasks::TaskList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One conversation entry exchanged with the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Termination {
    /// The oracle gave a final answer.
    Completed,
    IterationLimitReached,
    /// Too many consecutive guard denials (only when a streak limit is configured).
    PolicyViolation { consecutive_denials: u32 },
    OracleError(String),
    /// Operator abort, observed at the top of a turn.
    Cancelled,
}

impl Termination {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::IterationLimitReached => "iteration_limit_reached",
            Self::PolicyViolation { .. } => "policy_violation",
            Self::OracleError(_) => "oracle_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::IterationLimitReached => f.write_str("iteration limit reached"),
            Self::PolicyViolation {
                consecutive_denials,
            } => write!(
                f,
                "policy violation ({consecutive_denials} consecutive denials)"
            ),
            Self::OracleError(message) => write!(f, "oracle error: {message}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub(crate) conversation: Vec<Message>,
    pub(crate) files_read: BTreeSet<PathBuf>,
    pub(crate) tasks: TaskList,
    pub(crate) iteration: u32,
    pub(crate) termination: Option<Termination>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    /// Canonical paths successfully read during the run.
    pub fn files_read(&self) -> &BTreeSet<PathBuf> {
        &self.files_read
    }

    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    /// Completed tool-dispatch rounds.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    pub fn termination_reason(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    /// Content of the most recent non-empty assistant message.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.conversation
            .iter()
            .rev()
            .filter(|message| message.role == Role::Assistant)
            .map(|message| message.content.trim())
            .find(|content| !content.is_empty())
    }

    pub(crate) fn push(&mut self, message: Message) {
        debug_assert!(!self.is_terminated(), "state is read-only after termination");
        self.conversation.push(message);
    }

    /// Record the first termination reason; later calls are ignored.
    pub(crate) fn terminate(&mut self, reason: Termination) {
        if self.termination.is_none() {
            self.termination = Some(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_assistant_text_skips_empty_tool_turns() {
        let mut state = AgentState::new();
        state.push(Message::user("plan it"));
        state.push(Message::assistant("Looking around.", Vec::new()));
        state.push(Message::assistant("  ", Vec::new()));
        state.push(Message::tool("call_1", "{}"));
        assert_eq!(state.last_assistant_text(), Some("Looking around."));
    }

    #[test]
    fn first_termination_reason_wins() {
        let mut state = AgentState::new();
        state.terminate(Termination::Cancelled);
        state.terminate(Termination::Completed);
        assert!(state.is_terminated());
        assert_eq!(state.termination_reason(), Some(&Termination::Cancelled));
    }

    #[test]
    fn termination_serializes_with_reason_tag() {
        let json = serde_json::to_value(Termination::PolicyViolation {
            consecutive_denials: 3,
        })
        .expect("json");
        assert_eq!(
            json,
            serde_json::json!({"reason": "policy_violation", "detail": {"consecutive_denials": 3}})
        );
        assert_eq!(
            serde_json::to_value(Termination::Completed).expect("json"),
            serde_json::json!({"reason": "completed"})
        );
    }
}
