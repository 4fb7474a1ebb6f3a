//! Configuration management for Patchwright.
//!
//! [`AppConfig`] is loaded from an optional JSON settings file; every field
//! has a default, so an empty object (or no file at all) is a valid
//! configuration. The CLI layers flags and environment variables on top.

use crate::error::{PatchwrightError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default directory under which per-task workspaces are created.
pub const DEFAULT_WORKSPACE_ROOT: &str = "_patchwright_temp_";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4o";

fn default_workspace_root() -> PathBuf {
    PathBuf::from(DEFAULT_WORKSPACE_ROOT)
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_tool_turns() -> u32 {
    16
}

fn default_true() -> bool {
    true
}

/// What to do when file selection comes back empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmptySelectionPolicy {
    /// Continue the attempt with no relevant files
    #[default]
    Proceed,
    /// End the attempt unsatisfied and try again
    Retry,
    /// Fail the task
    Fail,
}

impl fmt::Display for EmptySelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Proceed => "proceed",
            Self::Retry => "retry",
            Self::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// Language model connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider name. Only `openai` (and compatible endpoints) is built in.
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key. The key itself is never
    /// stored in configuration.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_base: default_api_base(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmSettings {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(PatchwrightError::invalid_config("llm.model", "must not be empty"));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(PatchwrightError::invalid_config(
                "llm.temperature",
                format!("must be between 0.0 and 2.0, got {}", self.temperature),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(PatchwrightError::invalid_config(
                "llm.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(PatchwrightError::invalid_config(
                "llm.api_key_env",
                "must name an environment variable",
            ));
        }
        Ok(())
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding one workspace per task.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    #[serde(default)]
    pub llm: LlmSettings,

    /// Maximum attempts of the select/propose/generate/assess loop.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum model turns while collecting edit operations in one attempt.
    #[serde(default = "default_max_tool_turns")]
    pub max_tool_turns: u32,

    #[serde(default)]
    pub empty_selection: EmptySelectionPolicy,

    /// Drop selected paths that cannot be read from the workspace.
    #[serde(default = "default_true")]
    pub verify_selected_files: bool,

    /// Include the last self-assessment feedback in the next attempt.
    #[serde(default = "default_true")]
    pub feedback_to_next_attempt: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            llm: LlmSettings::default(),
            max_retries: default_max_retries(),
            max_tool_turns: default_max_tool_turns(),
            empty_selection: EmptySelectionPolicy::default(),
            verify_selected_files: true,
            feedback_to_next_attempt: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON settings file.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PatchwrightError::config_with_path(
                format!("failed to read settings: {}", e),
                path.to_path_buf(),
            )
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PatchwrightError::config_with_path(
                format!("failed to parse settings: {}", e),
                path.to_path_buf(),
            )
        })
    }

    /// Load from `path` if given, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns `Config` if an explicit file cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(PatchwrightError::invalid_config(
                "max_retries",
                "must be at least 1",
            ));
        }
        if self.max_tool_turns == 0 {
            return Err(PatchwrightError::invalid_config(
                "max_tool_turns",
                "must be at least 1",
            ));
        }
        if self.workspace_root.as_os_str().is_empty() {
            return Err(PatchwrightError::invalid_config(
                "workspace_root",
                "must not be empty",
            ));
        }
        self.llm.validate()
    }
}
