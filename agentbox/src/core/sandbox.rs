//! Sandbox policy and the guard that enforces it.
//!
//! A [`Policy`] is built once per run and never changes afterwards. Every
//! filesystem or process request is expressed as an [`Operation`] and run
//! through [`authorize`], which is a pure decision over the policy plus the
//! resolved target path.
//!
//! Evaluation order is fixed:
//! 1. process spawning and VCS access are denied outright;
//! 2. the target is resolved (symlinks, `..`) and must stay under the root;
//! 3. reads inside the root are allowed;
//! 4. writes need `Limited` mode, the use case's write capability, and operator
//!    consent. Each missing factor has its own [`DenyReason`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::path::{is_within, resolve};

/// Permission envelope for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxMode {
    /// Read-only: reads inside the root, nothing else.
    Full,
    /// Reads inside the root; writes only when every write factor holds.
    Limited,
}

impl SandboxMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Limited => "limited",
        }
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building a [`Policy`].
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("project root {} cannot be resolved: {source}", path.display())]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("project root {} is not a directory", path.display())]
    RootNotDirectory { path: PathBuf },
}

/// Immutable authorization inputs for one run.
///
/// Fields are private so a policy can only come from [`Policy::new`], which is
/// where the root is canonicalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    mode: SandboxMode,
    project_root: PathBuf,
    allows_writes: bool,
    user_consent: bool,
}

impl Policy {
    pub fn new(
        mode: SandboxMode,
        project_root: &Path,
        allows_writes: bool,
        user_consent: bool,
    ) -> Result<Self, PolicyError> {
        let canonical =
            fs::canonicalize(project_root).map_err(|source| PolicyError::RootUnavailable {
                path: project_root.to_path_buf(),
                source,
            })?;
        if !canonical.is_dir() {
            return Err(PolicyError::RootNotDirectory { path: canonical });
        }
        Ok(Self {
            mode,
            project_root: canonical,
            allows_writes,
            user_consent,
        })
    }

    pub fn mode(&self) -> SandboxMode {
        self.mode
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn allows_writes(&self) -> bool {
        self.allows_writes
    }

    pub fn user_consent(&self) -> bool {
        self.user_consent
    }

    /// Write factors that do not hold, in reporting order. Empty means writes are allowed.
    pub fn missing_write_factors(&self) -> Vec<DenyReason> {
        let mut missing = Vec::new();
        if self.mode != SandboxMode::Limited {
            missing.push(DenyReason::ModeForbidsWrites);
        }
        if !self.allows_writes {
            missing.push(DenyReason::WriteCapabilityMissing);
        }
        if !self.user_consent {
            missing.push(DenyReason::ConsentMissing);
        }
        missing
    }
}

/// Kind of filesystem mutation carried by [`Operation::WritePath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

impl WriteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request submitted to the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    ReadPath(&'a Path),
    WritePath {
        path: &'a Path,
        payload: &'a str,
        kind: WriteKind,
    },
    SpawnProcess {
        program: &'a str,
    },
    VcsAccess {
        command: &'a str,
    },
}

impl Operation<'_> {
    /// Short label used in logs and violation messages.
    pub fn label(&self) -> String {
        match self {
            Self::ReadPath(path) => format!("read {}", path.display()),
            Self::WritePath { path, kind, .. } => format!("{kind} {}", path.display()),
            Self::SpawnProcess { program } => format!("spawn {program}"),
            Self::VcsAccess { command } => format!("vcs {command}"),
        }
    }
}

/// Why an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    #[error("path resolves outside the project root")]
    OutsideRoot,
    #[error("the running use case does not declare write capability")]
    WriteCapabilityMissing,
    #[error("sandbox mode does not permit writes")]
    ModeForbidsWrites,
    #[error("the operator has not consented to writes (pass --write)")]
    ConsentMissing,
    #[error("process execution and version control access are never permitted")]
    OperationCategoricallyForbidden,
}

impl DenyReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::OutsideRoot => "outside_root",
            Self::WriteCapabilityMissing => "write_capability_missing",
            Self::ModeForbidsWrites => "mode_forbids_writes",
            Self::ConsentMissing => "consent_missing",
            Self::OperationCategoricallyForbidden => "operation_categorically_forbidden",
        }
    }
}

/// Outcome of [`authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decide whether `op` is permitted under `policy`.
pub fn authorize(policy: &Policy, op: &Operation<'_>) -> Decision {
    let (path, is_write) = match op {
        Operation::SpawnProcess { .. } | Operation::VcsAccess { .. } => {
            return Decision::Deny(DenyReason::OperationCategoricallyForbidden);
        }
        Operation::ReadPath(path) => (*path, false),
        Operation::WritePath { path, .. } => (*path, true),
    };

    let resolved = resolve(policy.project_root(), path);
    if !is_within(policy.project_root(), &resolved) {
        return Decision::Deny(DenyReason::OutsideRoot);
    }

    if !is_write {
        return Decision::Allow;
    }
    match policy.missing_write_factors().first() {
        Some(reason) => Decision::Deny(*reason),
        None => Decision::Allow,
    }
}

/// A denied operation, as a typed error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} denied: {reason}")]
pub struct Violation {
    pub reason: DenyReason,
    pub operation: String,
}

/// Policy-bound evaluator used by tools before any I/O.
#[derive(Debug, Clone)]
pub struct Guard {
    policy: Policy,
}

impl Guard {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn root(&self) -> &Path {
        self.policy.project_root()
    }

    /// Resolve a tool-supplied path the same way [`authorize`] does.
    pub fn resolve(&self, requested: &Path) -> PathBuf {
        resolve(self.root(), requested)
    }

    pub fn authorize(&self, op: &Operation<'_>) -> Decision {
        authorize(&self.policy, op)
    }

    /// Like [`Guard::authorize`] but turns a denial into a [`Violation`].
    pub fn check(&self, op: &Operation<'_>) -> Result<(), Violation> {
        match self.authorize(op) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(Violation {
                reason,
                operation: op.label(),
            }),
        }
    }

    /// Authorize a read and return the resolved target.
    pub fn admit_read(&self, requested: &Path) -> Result<PathBuf, Violation> {
        let target = self.resolve(requested);
        self.check(&Operation::ReadPath(&target))?;
        Ok(target)
    }

    /// Authorize a write and return the resolved target.
    pub fn admit_write(
        &self,
        requested: &Path,
        payload: &str,
        kind: WriteKind,
    ) -> Result<PathBuf, Violation> {
        let target = self.resolve(requested);
        self.check(&Operation::WritePath {
            path: &target,
            payload,
            kind,
        })?;
        Ok(target)
    }
}
