//! Use-case registry.
//!
//! A static table: each entry names its sandbox mode, whether it may write,
//! and which tools it gets. The [`Policy`] for a run is derived from the entry
//! plus the operator's consent, and nowhere else.

use std::path::Path;

use clap::ValueEnum;

use crate::core::sandbox::{Policy, PolicyError, SandboxMode};
use crate::tools::registry::{RegistryError, ToolRegistry};
use crate::tools::{ToolName, fs, todo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseCase {
    pub id: &'static str,
    pub summary: &'static str,
    pub mode: SandboxMode,
    pub allows_writes: bool,
    pub tools: &'static [ToolName],
    /// Files a use case reads first when the operator names none.
    pub default_context: &'static [&'static str],
}

const READ_TOOLS: &[ToolName] = &[ToolName::Tree, ToolName::ReadFile];

const PLANNING_TOOLS: &[ToolName] = &[
    ToolName::Tree,
    ToolName::ReadFile,
    ToolName::TodoView,
    ToolName::TodoAdd,
    ToolName::TodoEdit,
];

const WRITING_TOOLS: &[ToolName] = &[
    ToolName::Tree,
    ToolName::ReadFile,
    ToolName::WriteFile,
    ToolName::TodoView,
    ToolName::TodoAdd,
    ToolName::TodoEdit,
];

pub const ASK: UseCase = UseCase {
    id: "ask",
    summary: "Answer a question about the project from its files",
    mode: SandboxMode::Full,
    allows_writes: false,
    tools: READ_TOOLS,
    default_context: &["README.md"],
};

pub const TASK: UseCase = UseCase {
    id: "task",
    summary: "Turn an objective into a prioritized plan with minimal exploration",
    mode: SandboxMode::Full,
    allows_writes: false,
    tools: PLANNING_TOOLS,
    default_context: &["README.md"],
};

pub const AGENTIC_TASK: UseCase = UseCase {
    id: "agentic_task",
    summary: "Explore the project, then build a comprehensive action plan",
    mode: SandboxMode::Full,
    allows_writes: false,
    tools: PLANNING_TOOLS,
    default_context: &[],
};

pub const TESTWRITE: UseCase = UseCase {
    id: "testwrite",
    summary: "Write tests for a target file or directory",
    mode: SandboxMode::Limited,
    allows_writes: true,
    tools: WRITING_TOOLS,
    default_context: &["Cargo.toml", "pyproject.toml", "requirements.txt", "setup.py"],
};

pub const USE_CASES: &[UseCase] = &[ASK, TASK, AGENTIC_TASK, TESTWRITE];

pub fn lookup(id: &str) -> Option<&'static UseCase> {
    USE_CASES.iter().find(|use_case| use_case.id == id)
}

impl UseCase {
    /// Build the run policy. `user_consent` only matters for writing use cases.
    pub fn policy(&self, root: &Path, user_consent: bool) -> Result<Policy, PolicyError> {
        Policy::new(self.mode, root, self.allows_writes, user_consent)
    }

    /// Registry with exactly this use case's tools.
    pub fn registry(&self) -> Result<ToolRegistry, RegistryError> {
        let mut registry = ToolRegistry::new();
        for name in self.tools {
            let descriptor = match name {
                ToolName::Tree => fs::tree(),
                ToolName::ReadFile => fs::read_file(),
                ToolName::WriteFile => fs::write_file(),
                ToolName::TodoView => todo::view(),
                ToolName::TodoAdd => todo::add(),
                ToolName::TodoEdit => todo::edit(),
            };
            registry.register(descriptor)?;
        }
        Ok(registry)
    }
}

/// How much exploring a planning run does before writing the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlanMode {
    /// Plan with just enough context.
    Plan,
    /// Explore thoroughly, then plan.
    #[value(name = "explore+plan")]
    ExplorePlan,
}

impl PlanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::ExplorePlan => "explore+plan",
        }
    }

    pub fn use_case(self) -> &'static UseCase {
        match self {
            Self::Plan => &TASK,
            Self::ExplorePlan => &AGENTIC_TASK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RiskLevel {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TestFramework {
    Pytest,
    Unittest,
    Cargo,
}

impl TestFramework {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pytest => "pytest",
            Self::Unittest => "unittest",
            Self::Cargo => "cargo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Placement {
    NewFile,
    Inline,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewFile => "new-file",
            Self::Inline => "inline",
        }
    }
}
