//! Log-line heuristics that detect agent file-system activity.
//!
//! Matching is best-effort string inspection of third-party log output. It is
//! isolated here so the rule can change without touching the timing logic.

use crate::config::DetectorConfig;
use crate::coordinator::ActivityInput;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static RE_TOOL_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""path":\s*"([^"]+)""#).unwrap());

/// Extracts the `"path": "..."` argument from a tool invocation log line.
pub fn extract_tool_path(line: &str) -> Option<String> {
    RE_TOOL_PATH
        .captures(line)
        .map(|captures| captures[1].to_string())
}

pub struct SignalDetector {
    config: DetectorConfig,
    input: Arc<dyn ActivityInput>,
}

impl SignalDetector {
    pub fn new(config: DetectorConfig, input: Arc<dyn ActivityInput>) -> Self {
        Self { config, input }
    }

    /// True when the line carries the tool marker and a file-operation verb.
    pub fn matches(&self, line: &str) -> bool {
        if self.config.tool_marker.is_empty() || !line.contains(&self.config.tool_marker) {
            return false;
        }
        self.config
            .verbs
            .iter()
            .any(|verb| !verb.is_empty() && line.contains(verb.as_str()))
    }

    /// Signals AI activity for matching lines. Returns whether it matched.
    pub fn observe(&self, line: &str) -> bool {
        if !self.matches(line) {
            return false;
        }

        tracing::info!(
            path_hint = ?extract_tool_path(line),
            "Detected agent file-system activity"
        );
        self.input.signal_ai_activity();
        true
    }
}
