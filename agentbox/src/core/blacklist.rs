//! Content the agent must never see, even inside the project root.
//!
//! Patterns are globs. A pattern ending in `/` names a directory and matches
//! any component of the candidate path; every other pattern is tried against
//! the file name and against the whole root-relative path. Exceptions
//! (`extra_ignores`) re-allow paths that a pattern would otherwise block,
//! except under [`PROTECTED_DIR`], which stays blocked whatever the config says.

use std::path::{Component, Path};

use glob::{MatchOptions, Pattern, PatternError};

/// Directory holding the agent's own config. Never readable or writable by tools.
pub const PROTECTED_DIR: &str = ".ai";

/// Built-in deny list.
pub const DEFAULT_PATTERNS: &[&str] = &[
    // agent configuration
    ".ai/",
    // vcs and editor state
    ".git/",
    ".jj/",
    ".hg/",
    ".svn/",
    ".idea/",
    ".vscode/",
    // environments, dependencies, build output
    ".venv/",
    "venv/",
    "node_modules/",
    "dist/",
    "build/",
    "target/",
    "__pycache__/",
    // secrets
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*.p12",
    "id_*",
    // binary media and archives
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.mp4",
    "*.mov",
    "*.zip",
    "*.tar",
    "*.gz",
];

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct Blacklist {
    dirs: Vec<Pattern>,
    files: Vec<Pattern>,
    exceptions: Vec<Pattern>,
}

impl Blacklist {
    /// Default patterns plus `extra_patterns`, with `extra_ignores` as exceptions.
    pub fn new(extra_patterns: &[String], extra_ignores: &[String]) -> Result<Self, PatternError> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let all = DEFAULT_PATTERNS
            .iter()
            .copied()
            .chain(extra_patterns.iter().map(String::as_str));
        for raw in all {
            match raw.strip_suffix('/') {
                Some(dir) => dirs.push(Pattern::new(dir)?),
                None => files.push(Pattern::new(raw)?),
            }
        }
        let exceptions = extra_ignores
            .iter()
            .map(|raw| Pattern::new(raw.trim_end_matches('/')))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dirs,
            files,
            exceptions,
        })
    }

    /// The built-in patterns only.
    pub fn builtin() -> Result<Self, PatternError> {
        Self::new(&[], &[])
    }

    /// Whether the root-relative `relative` path is blocked.
    pub fn is_blocked(&self, relative: &Path) -> bool {
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let Some(name) = parts.last() else {
            return false;
        };
        let joined = parts.join("/");

        let blocked = parts
            .iter()
            .any(|part| self.dirs.iter().any(|p| p.matches_with(part, MATCH)))
            || self
                .files
                .iter()
                .any(|p| p.matches_with(name, MATCH) || p.matches_with(&joined, MATCH));
        if !blocked {
            return false;
        }
        if parts.iter().any(|part| part == PROTECTED_DIR) {
            return true;
        }
        !self
            .exceptions
            .iter()
            .any(|p| p.matches_with(&joined, MATCH) || p.matches_with(name, MATCH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_directories_at_any_depth() {
        let blacklist = Blacklist::builtin().expect("blacklist");
        assert!(blacklist.is_blocked(Path::new(".git")));
        assert!(blacklist.is_blocked(Path::new(".git/config")));
        assert!(blacklist.is_blocked(Path::new("web/node_modules/react/index.js")));
        assert!(!blacklist.is_blocked(Path::new("src/builder.rs")));
    }

    #[test]
    fn blocks_secrets_and_binaries_by_name() {
        let blacklist = Blacklist::builtin().expect("blacklist");
        assert!(blacklist.is_blocked(Path::new(".env")));
        assert!(blacklist.is_blocked(Path::new("config/.env.production")));
        assert!(blacklist.is_blocked(Path::new("keys/server.pem")));
        assert!(blacklist.is_blocked(Path::new("home/id_ed25519")));
        assert!(blacklist.is_blocked(Path::new("docs/logo.png")));
        assert!(!blacklist.is_blocked(Path::new("docs/guide.md")));
    }

    #[test]
    fn extra_ignores_re_allow_blocked_paths() {
        let blacklist =
            Blacklist::new(&[], &[".env.example".to_string()]).expect("blacklist");
        assert!(!blacklist.is_blocked(Path::new(".env.example")));
        assert!(blacklist.is_blocked(Path::new(".env.local")));
    }

    #[test]
    fn extra_patterns_extend_defaults() {
        let blacklist = Blacklist::new(&["*.sqlite".to_string(), "fixtures/".to_string()], &[])
            .expect("blacklist");
        assert!(blacklist.is_blocked(Path::new("data/app.sqlite")));
        assert!(blacklist.is_blocked(Path::new("tests/fixtures/big.json")));
        assert!(blacklist.is_blocked(Path::new(".git")));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(Blacklist::new(&["[".to_string()], &[]).is_err());
    }

    #[test]
    fn agent_config_dir_cannot_be_re_allowed() {
        let blacklist = Blacklist::new(&[], &[".ai".to_string(), "config.toml".to_string()])
            .expect("blacklist");
        assert!(blacklist.is_blocked(Path::new(".ai")));
        assert!(blacklist.is_blocked(Path::new(".ai/config.toml")));
        assert!(!blacklist.is_blocked(Path::new("docs/ai/config.toml")));
    }

    #[test]
    fn root_itself_is_never_blocked() {
        assert!(!Blacklist::builtin().expect("blacklist").is_blocked(Path::new("")));
    }
}
