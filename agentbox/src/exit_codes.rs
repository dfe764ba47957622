//! Stable exit codes for the `ai` CLI.

use crate::agent::state::Termination;

/// The run completed, or a non-agent command succeeded.
pub const OK: i32 = 0;
/// Invalid input, config or project root, or another internal error.
pub const INVALID: i32 = 1;
/// The run used its whole iteration budget without a final answer.
pub const ITERATION_LIMIT: i32 = 2;
/// The oracle failed (timeout, transport, bad response).
pub const ORACLE_ERROR: i32 = 3;
/// The run hit the configured consecutive-denial limit.
pub const POLICY_VIOLATION: i32 = 4;
/// The operator cancelled the run.
pub const CANCELLED: i32 = 130;

pub fn for_termination(termination: &Termination) -> i32 {
    match termination {
        Termination::Completed => OK,
        Termination::IterationLimitReached => ITERATION_LIMIT,
        Termination::OracleError(_) => ORACLE_ERROR,
        Termination::PolicyViolation { .. } => POLICY_VIOLATION,
        Termination::Cancelled => CANCELLED,
    }
}
