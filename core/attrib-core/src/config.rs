//! Configuration loading for the attribution engine.
//!
//! Every field has a default, so a missing file is equivalent to an empty one.
//! The file lives at `~/.attrib/config.toml` unless `ATTRIB_CONFIG` points
//! elsewhere.

use crate::error::{AttribError, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_ENV: &str = "ATTRIB_CONFIG";
const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".attrib/config.toml";

pub const DEFAULT_AI_SIGNAL_WINDOW_MS: u64 = 2000;
pub const DEFAULT_AI_GRACE_PERIOD_MS: u64 = 5000;
pub const DEFAULT_HUMAN_DEBOUNCE_MS: u64 = 1500;
pub const DEFAULT_SINK_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_STACK_DEPTH: usize = 30;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttribConfig {
    pub timing: TimingConfig,
    pub sink: SinkConfig,
    pub agent: AgentIdentity,
    pub detector: DetectorConfig,
    pub commands: CommandFilterConfig,
}

/// Correlation windows, in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub ai_signal_window_ms: u64,
    pub ai_grace_period_ms: u64,
    pub human_debounce_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ai_signal_window_ms: DEFAULT_AI_SIGNAL_WINDOW_MS,
            ai_grace_period_ms: DEFAULT_AI_GRACE_PERIOD_MS,
            human_debounce_ms: DEFAULT_HUMAN_DEBOUNCE_MS,
        }
    }
}

impl TimingConfig {
    pub fn ai_signal_window(&self) -> Duration {
        Duration::from_millis(self.ai_signal_window_ms)
    }

    pub fn ai_grace_period(&self) -> Duration {
        Duration::from_millis(self.ai_grace_period_ms)
    }

    pub fn human_debounce(&self) -> Duration {
        Duration::from_millis(self.human_debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Explicit path to the `git-ai` binary. Resolved from the home
    /// directory or `PATH` when unset.
    pub binary: Option<PathBuf>,
    pub timeout_ms: u64,
    /// Repository roots that receive checkpoints.
    pub workspaces: Vec<PathBuf>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            binary: None,
            timeout_ms: DEFAULT_SINK_TIMEOUT_MS,
            workspaces: Vec::new(),
        }
    }
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Identity reported in agent checkpoint payloads.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentIdentity {
    pub name: String,
    pub model: String,
    pub conversation_prefix: String,
}

impl Default for AgentIdentity {
    fn default() -> Self {
        Self {
            name: "aws-q".to_string(),
            model: "amazon-q".to_string(),
            conversation_prefix: "intellij".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DetectorConfig {
    pub tool_marker: String,
    pub verbs: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tool_marker: "ToolUseEvent".to_string(),
            verbs: vec![
                "fsWrite".to_string(),
                "fsReplace".to_string(),
                "fsDelete".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandFilterConfig {
    /// Substrings (case-insensitive) naming the integration's own commands.
    pub own_commands: Vec<String>,
    /// Exact command names that never indicate human editing.
    pub ignored: Vec<String>,
    /// Stack frame substrings (case-insensitive) that identify agent code.
    pub agent_frame_markers: Vec<String>,
    pub stack_depth: usize,
}

impl Default for CommandFilterConfig {
    fn default() -> Self {
        Self {
            own_commands: vec!["git-ai".to_string()],
            ignored: vec!["Reload From Disk".to_string()],
            agent_frame_markers: vec![
                "software.aws.toolkits".to_string(),
                "jetbrains.services.amazonq".to_string(),
            ],
            stack_depth: DEFAULT_STACK_DEPTH,
        }
    }
}

/// Returns the attrib state directory (`~/.attrib`).
pub fn get_attrib_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".attrib"))
}

pub fn default_config_path() -> Result<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or(AttribError::HomeDirNotFound)?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Loads configuration from `path` (or the default location).
///
/// A missing file yields defaults; an unreadable or malformed file is an error.
pub fn load_config(path: Option<PathBuf>) -> Result<AttribConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(AttribConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| AttribError::Io {
        context: format!("reading config {}", config_path.display()),
        source,
    })?;

    toml::from_str::<AttribConfig>(&content).map_err(|err| AttribError::ConfigMalformed {
        path: config_path.clone(),
        details: err.to_string(),
    })
}
