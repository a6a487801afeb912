//! attrib-hook: forwards editor activity to the attribution daemon.
//!
//! Editor integrations call this binary instead of speaking the socket
//! protocol themselves.
//!
//! ## Subcommands
//!
//! - `log`: forward agent log lines (argument or stdin)
//! - `file`: report a file change from the editor's file system
//! - `command`: report a finished editor command with its call stack
//! - `stats`: print AI/human authorship for recent commits
//! - `health`: query the daemon

mod daemon_client;
mod logging;
mod stats;

use attrib_core::{load_config, AttribConfig, FileChangeKind};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "attrib-hook")]
#[command(about = "Editor activity bridge for AI attribution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward agent log lines (reads stdin when LINE is omitted)
    Log {
        #[arg(value_name = "LINE")]
        line: Option<String>,
    },

    /// Report a file change
    File {
        /// Absolute path of the changed file
        #[arg(value_name = "PATH")]
        path: String,

        /// create, modify, move or delete
        #[arg(long, default_value = "modify")]
        kind: String,
    },

    /// Report a finished editor command
    Command {
        /// Command name as reported by the editor (may be empty)
        #[arg(value_name = "NAME", allow_hyphen_values = true)]
        name: String,

        /// Call stack frame, innermost first (repeatable)
        #[arg(long = "frame", value_name = "FRAME")]
        frames: Vec<String>,
    },

    /// Print authorship statistics for recent commits
    Stats {
        /// Repository to analyse
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Number of commits to include
        #[arg(long, default_value_t = stats::DEFAULT_DEPTH)]
        depth: u32,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Query daemon health
    Health,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let config = match load_config(None) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to load config; using defaults");
            AttribConfig::default()
        }
    };

    match cli.command {
        Commands::Log { line } => {
            let marker = config.detector.tool_marker.as_str();
            match line {
                Some(line) => forward_log_line(&line, marker),
                None => {
                    let stdin = std::io::stdin();
                    for line in stdin.lock().lines() {
                        match line {
                            Ok(line) => forward_log_line(&line, marker),
                            Err(err) => {
                                tracing::warn!(error = %err, "Failed to read log line from stdin");
                                break;
                            }
                        }
                    }
                }
            }
        }
        Commands::File { path, kind } => {
            let Some(kind) = FileChangeKind::parse(&kind) else {
                eprintln!("Unknown change kind: {}", kind);
                std::process::exit(2);
            };
            // Delivery failures are non-critical: never disrupt the editor.
            if let Err(e) = daemon_client::send_file_change(&path, kind.as_str()) {
                tracing::warn!(error = %e, path = %path, "attrib-hook file failed");
            }
        }
        Commands::Command { name, frames } => {
            if let Err(e) = daemon_client::send_command_finished(&name, &frames) {
                tracing::warn!(error = %e, command = %name, "attrib-hook command failed");
            }
        }
        Commands::Stats { repo, depth, json } => {
            if let Err(e) = stats::run(&config, &repo, depth, json) {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
        Commands::Health => match daemon_client::daemon_health() {
            Ok(data) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string())
                );
            }
            Err(e) => {
                eprintln!("Daemon unavailable: {}", e);
                std::process::exit(1);
            }
        },
    }
}

/// Lines without the tool marker can never be signals; skip the round trip.
fn forward_log_line(line: &str, marker: &str) {
    if !line.contains(marker) {
        return;
    }
    if let Err(e) = daemon_client::send_log_line(line) {
        tracing::warn!(error = %e, "attrib-hook log failed");
    }
}
