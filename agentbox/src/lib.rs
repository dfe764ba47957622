//! Sandboxed, tool-using agent runner.
//!
//! An oracle (a remote language model, or a script in tests) drives a bounded
//! loop of tool calls against a project directory. Every filesystem touch goes
//! through one authorization function, so the sandbox holds no matter what the
//! oracle asks for.
//!
//! - **[`core`]**: Pure, deterministic logic (sandbox policy, path resolution,
//!   blacklist, task list). No I/O beyond path canonicalization.
//! - **[`io`]**: Side-effecting operations (config file, staged file writes,
//!   the HTTP oracle).
//! - **[`tools`]** and **[`agent`]**: the tool registry and the agent loop.
//!
//! Orchestration modules ([`run`], [`usecase`], [`report`]) tie these together
//! for the `ai` CLI.

pub mod agent;
pub mod cancel;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod report;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
pub mod usecase;
