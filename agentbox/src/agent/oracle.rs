//! The reasoning-oracle contract.
//!
//! The engine depends only on [`Oracle`]. Implementations decide transport,
//! retries and timeouts; whatever error they return ends the run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::agent::state::Message;

/// A tool invocation requested by the oracle. `arguments` is raw JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Everything the oracle sees for one turn.
#[derive(Debug, Clone)]
pub struct OracleRequest<'a> {
    /// Rendered per turn; never stored in the conversation.
    pub system: &'a str,
    pub conversation: &'a [Message],
    pub tools: &'a [Value],
    pub max_tokens: u32,
    pub timeout: Duration,
    /// Advisory per-turn cap on requested tool calls.
    pub max_tool_calls: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleResponse {
    /// No tool calls: the run is complete.
    Final { content: String },
    ToolCalls {
        content: String,
        calls: Vec<ToolCall>,
    },
}

impl OracleResponse {
    pub fn from_parts(content: String, calls: Vec<ToolCall>) -> Self {
        if calls.is_empty() {
            Self::Final { content }
        } else {
            Self::ToolCalls { content, calls }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle did not answer within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("oracle transport failure: {0}")]
    Transport(String),
    #[error("oracle returned HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error("environment variable {var} is not set")]
    MissingApiKey { var: String },
}

/// A source of turns: a remote model, a local one, or a script in tests.
pub trait Oracle {
    fn respond(&self, request: &OracleRequest<'_>) -> Result<OracleResponse, OracleError>;
}
