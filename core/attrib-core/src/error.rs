//! Error types for attrib-core operations.
//!
//! Nothing in the correlation engine is fatal: these errors are logged at the
//! worker boundary and the engine keeps running.

use std::path::PathBuf;

/// All errors that can occur in attrib-core operations.
#[derive(Debug, thiserror::Error)]
pub enum AttribError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Sink Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Checkpoint binary not found at {0}")]
    SinkBinaryMissing(PathBuf),

    #[error("No workspace configured for checkpoints")]
    NoWorkspace,

    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Command timed out after {timeout_ms}ms: {command}")]
    CommandTimedOut { command: String, timeout_ms: u64 },

    // ─────────────────────────────────────────────────────────────────────
    // Engine Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Coordinator worker is no longer running")]
    WorkerStopped,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using AttribError.
pub type Result<T> = std::result::Result<T, AttribError>;

impl From<AttribError> for String {
    fn from(err: AttribError) -> String {
        err.to_string()
    }
}
