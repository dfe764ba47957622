//! Deterministic logic shared by the sandbox and the agent loop.
//!
//! Core modules hold no handles and write nothing. The only filesystem access
//! allowed here is metadata resolution (canonicalizing a path before a
//! containment check); everything else operates on in-memory values.

pub mod blacklist;
pub mod path;
pub mod sandbox;
pub mod tasks;
