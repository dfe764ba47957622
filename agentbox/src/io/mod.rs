//! Side-effecting collaborators: config file, oracle transport, file writes.

pub mod config;
pub mod openai;
pub mod writer;
