//! Shared value types passed between producers, the coordinator and sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who a checkpoint attributes the change to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Human,
    Ai,
}

/// One-shot notification emitted after a checkpoint dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointRecord {
    pub kind: CheckpointKind,
    pub file_path: Option<String>,
    pub fired_at: DateTime<Utc>,
    /// False when the sink reported an error or timed out.
    pub succeeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Create,
    Modify,
    Move,
    Delete,
}

impl FileChangeKind {
    /// Parses the host's event kind name. Unknown names are treated as `None`
    /// so callers can fall back to [`FileChangeKind::Modify`].
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" | "created" | "copy" => Some(Self::Create),
            "modify" | "modified" | "change" | "content" => Some(Self::Modify),
            "move" | "moved" | "rename" => Some(Self::Move),
            "delete" | "deleted" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Move => "move",
            Self::Delete => "delete",
        }
    }
}

/// A file-system change reported by the host editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: String,
    pub kind: FileChangeKind,
}

impl FileChangeEvent {
    pub fn new(path: impl Into<String>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
