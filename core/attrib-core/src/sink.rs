//! Checkpoint sinks: where attribution decisions are recorded.
//!
//! The coordinator only knows the [`CheckpointSink`] trait. [`GitAiSink`] is
//! the production implementation, shelling out to the `git-ai` binary in each
//! configured workspace.

use crate::config::{AgentIdentity, AttribConfig};
use crate::error::{AttribError, Result};
use crate::process::{describe, run_until};
use crate::types::CheckpointRecord;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const GIT_AI_FALLBACK: &str = "git-ai";
const GIT_AI_HOME_RELATIVE_PATH: &str = ".git-ai/bin/git-ai";
const AGENT_PRESET: &str = "agent-v1";

/// Records checkpoints. Calls block until the record is written or the
/// implementation's timeout elapses.
pub trait CheckpointSink: Send {
    fn record_human(&self) -> Result<()>;
    fn record_agent_edit(&self, file_path: Option<&str>) -> Result<()>;
}

/// Receives a notification after each dispatch, e.g. to refresh a stats view.
pub trait CheckpointObserver: Send {
    fn checkpoint_recorded(&self, record: &CheckpointRecord);
}

/// Payload accepted by `git-ai checkpoint agent-v1 --hook-input`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentEditPayload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub repo_working_dir: String,
    pub edited_filepaths: Vec<String>,
    pub agent_name: String,
    pub model: String,
    pub conversation_id: String,
    pub transcript: Transcript,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub messages: Vec<serde_json::Value>,
}

impl AgentEditPayload {
    pub fn new(
        workspace: &Path,
        file_path: Option<&str>,
        agent: &AgentIdentity,
        timestamp_ms: i64,
    ) -> Self {
        let edited_filepaths = file_path
            .and_then(|path| relative_to_workspace(workspace, path))
            .into_iter()
            .collect();

        Self {
            payload_type: "ai_agent".to_string(),
            repo_working_dir: workspace.to_string_lossy().to_string(),
            edited_filepaths,
            agent_name: agent.name.clone(),
            model: agent.model.clone(),
            conversation_id: format!("{}-{}", agent.conversation_prefix, timestamp_ms),
            transcript: Transcript::default(),
        }
    }
}

/// Returns `path` relative to `workspace`, or `None` when it lies outside.
pub fn relative_to_workspace(workspace: &Path, path: &str) -> Option<String> {
    let relative = Path::new(path).strip_prefix(workspace).ok()?;
    let relative = relative.to_string_lossy().to_string();
    if relative.is_empty() {
        None
    } else {
        Some(relative)
    }
}

/// Resolves the `git-ai` binary: configured path, then `~/.git-ai/bin/git-ai`,
/// then whatever `git-ai` resolves to on `PATH`.
pub fn resolve_git_ai_binary(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    if let Some(home) = dirs::home_dir() {
        let candidate = home.join(GIT_AI_HOME_RELATIVE_PATH);
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from(GIT_AI_FALLBACK)
}

#[derive(Debug, Clone)]
pub struct GitAiSink {
    binary: PathBuf,
    workspaces: Vec<PathBuf>,
    agent: AgentIdentity,
    timeout: Duration,
}

impl GitAiSink {
    pub fn new(
        binary: PathBuf,
        workspaces: Vec<PathBuf>,
        agent: AgentIdentity,
        timeout: Duration,
    ) -> Self {
        Self {
            binary,
            workspaces,
            agent,
            timeout,
        }
    }

    pub fn from_config(config: &AttribConfig) -> Self {
        Self::new(
            resolve_git_ai_binary(config.sink.binary.as_deref()),
            config.sink.workspaces.clone(),
            config.agent.clone(),
            config.sink.timeout(),
        )
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn workspaces(&self) -> &[PathBuf] {
        &self.workspaces
    }

    fn ensure_binary(&self) -> Result<()> {
        if self.binary.is_absolute() && !self.binary.exists() {
            return Err(AttribError::SinkBinaryMissing(self.binary.clone()));
        }
        Ok(())
    }

    /// Runs one checkpoint per workspace; every workspace is attempted and
    /// the first failure is returned. All workspaces share one timeout, so a
    /// dispatch never holds the caller longer than `timeout`.
    fn for_each_workspace<F>(&self, mut args_for: F) -> Result<()>
    where
        F: FnMut(&Path) -> Result<Vec<String>>,
    {
        self.ensure_binary()?;
        if self.workspaces.is_empty() {
            return Err(AttribError::NoWorkspace);
        }

        let deadline = Instant::now() + self.timeout;
        let mut first_error = None;
        for workspace in &self.workspaces {
            let result =
                args_for(workspace).and_then(|args| self.run(workspace, &args, deadline));
            if let Err(err) = result {
                tracing::warn!(
                    workspace = %workspace.display(),
                    error = %err,
                    "Checkpoint command failed"
                );
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn run(&self, workspace: &Path, args: &[String], deadline: Instant) -> Result<()> {
        let output = run_until(&self.binary, args, workspace, deadline)?;
        if output.success {
            tracing::debug!(command = %describe(&self.binary, args), "Checkpoint recorded");
            Ok(())
        } else {
            Err(AttribError::CommandFailed {
                command: describe(&self.binary, args),
                details: format!(
                    "exit code {}: {}",
                    output
                        .code
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "signal".to_string()),
                    output.stderr.trim()
                ),
            })
        }
    }
}

impl CheckpointSink for GitAiSink {
    fn record_human(&self) -> Result<()> {
        self.for_each_workspace(|_| Ok(vec!["checkpoint".to_string()]))
    }

    fn record_agent_edit(&self, file_path: Option<&str>) -> Result<()> {
        let timestamp_ms = Utc::now().timestamp_millis();
        self.for_each_workspace(|workspace| {
            let payload = AgentEditPayload::new(workspace, file_path, &self.agent, timestamp_ms);
            let hook_input =
                serde_json::to_string(&payload).map_err(|source| AttribError::Json {
                    context: "serializing agent checkpoint payload".to_string(),
                    source,
                })?;
            Ok(vec![
                "checkpoint".to_string(),
                AGENT_PRESET.to_string(),
                "--hook-input".to_string(),
                hook_input,
            ])
        })
    }
}
