//! The agent execution loop and its collaborators.

pub mod engine;
pub mod oracle;
pub mod prompt;
pub mod state;
