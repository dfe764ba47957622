//! Agent configuration stored under `.ai/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Project-relative location of the config file.
pub const CONFIG_RELATIVE_PATH: &str = ".ai/config.toml";

pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_RELATIVE_PATH)
}

/// Agent configuration (TOML).
///
/// Meant to be edited by hand. Missing fields fall back to defaults, so an
/// empty file is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub oracle: OracleConfig,
    pub run: RunConfig,
    pub limits: LimitsConfig,
    pub blacklist: BlacklistConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of an OpenAI-compatible API (no trailing `/chat/completions`).
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. The key itself is never stored here.
    pub api_key_env: String,
    /// Wall-clock budget for one oracle round-trip, retries included.
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Extra attempts after a transient failure (transport, 429, 5xx).
    pub retries: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            max_tokens: 2000,
            temperature: 0.1,
            retries: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    pub max_iterations: u32,
    /// Default depth for the `tree` tool and the planning prompt.
    pub exploration_depth: u32,
    /// Advisory cap on tool calls per oracle turn, stated in the system prompt.
    pub max_tool_calls_per_turn: u32,
    /// End the run after this many consecutive guard denials. Unset: never.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_consecutive_denials: Option<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            exploration_depth: 3,
            max_tool_calls_per_turn: 5,
            max_consecutive_denials: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_file_bytes: u64,
    pub max_tree_entries: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            max_tree_entries: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BlacklistConfig {
    /// Additional deny patterns.
    pub extra_patterns: Vec<String>,
    /// Patterns that re-allow paths the deny list would block.
    pub extra_ignores: Vec<String>,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.oracle.base_url.trim().is_empty() {
            return Err(anyhow!("oracle.base_url must not be empty"));
        }
        if self.oracle.model.trim().is_empty() {
            return Err(anyhow!("oracle.model must not be empty"));
        }
        if self.oracle.api_key_env.trim().is_empty() {
            return Err(anyhow!("oracle.api_key_env must not be empty"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.max_tokens == 0 {
            return Err(anyhow!("oracle.max_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(anyhow!("oracle.temperature must be within 0.0..=2.0"));
        }
        if self.run.max_iterations == 0 {
            return Err(anyhow!("run.max_iterations must be > 0"));
        }
        if !(1..=10).contains(&self.run.exploration_depth) {
            return Err(anyhow!("run.exploration_depth must be within 1..=10"));
        }
        if self.run.max_tool_calls_per_turn == 0 {
            return Err(anyhow!("run.max_tool_calls_per_turn must be > 0"));
        }
        if self.run.max_consecutive_denials == Some(0) {
            return Err(anyhow!("run.max_consecutive_denials must be > 0 when set"));
        }
        if self.limits.max_file_bytes == 0 {
            return Err(anyhow!("limits.max_file_bytes must be > 0"));
        }
        if self.limits.max_tree_entries == 0 {
            return Err(anyhow!("limits.max_tree_entries must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
