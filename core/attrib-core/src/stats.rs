//! Authorship statistics for recent commits.
//!
//! Read-only: numbers come from `git-ai stats <rev> --json`; this module only
//! lists commits, parses the per-commit output and aggregates it.

use crate::process::{describe, run_with_timeout};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOG_FIELD_SEPARATOR: &str = "|||";
const LOG_FORMAT: &str = "--pretty=format:%H|||%h|||%an|||%s";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CommitStats {
    pub human_additions: u64,
    pub mixed_additions: u64,
    pub ai_additions: u64,
    pub ai_accepted: u64,
    pub total_ai_additions: u64,
    pub total_ai_deletions: u64,
    pub git_diff_added_lines: u64,
    pub git_diff_deleted_lines: u64,
    /// Seconds spent waiting on the agent.
    pub time_waiting_for_ai: f64,
}

/// Rounded percentage split of additions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorshipBreakdown {
    pub ai_pct: u32,
    pub mixed_pct: u32,
    pub human_pct: u32,
}

impl CommitStats {
    pub fn ai_total(&self) -> u64 {
        self.ai_additions + self.ai_accepted
    }

    pub fn total(&self) -> u64 {
        self.human_additions + self.mixed_additions + self.ai_total()
    }

    pub fn accumulate(&mut self, other: &CommitStats) {
        self.human_additions += other.human_additions;
        self.mixed_additions += other.mixed_additions;
        self.ai_additions += other.ai_additions;
        self.ai_accepted += other.ai_accepted;
        self.total_ai_additions += other.total_ai_additions;
        self.total_ai_deletions += other.total_ai_deletions;
        self.git_diff_added_lines += other.git_diff_added_lines;
        self.git_diff_deleted_lines += other.git_diff_deleted_lines;
        self.time_waiting_for_ai += other.time_waiting_for_ai;
    }

    /// `None` when there are no additions to split.
    pub fn breakdown(&self) -> Option<AuthorshipBreakdown> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let pct = |value: u64| ((value as f64 / total as f64) * 100.0).round() as u32;
        Some(AuthorshipBreakdown {
            ai_pct: pct(self.ai_total()),
            mixed_pct: pct(self.mixed_additions),
            human_pct: pct(self.human_additions),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitSummary {
    pub hash: String,
    pub short_hash: String,
    pub author: String,
    pub subject: String,
    pub stats: CommitStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentStats {
    pub aggregated: CommitStats,
    pub commits: Vec<CommitSummary>,
}

/// Parses `git-ai stats --json` output. The counters may sit at the root or
/// under `range_stats`; missing or non-numeric fields count as zero.
pub fn parse_commit_stats(json: &str) -> CommitStats {
    let value: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to parse stats JSON");
            return CommitStats::default();
        }
    };

    let root = value.get("range_stats").unwrap_or(&value);
    CommitStats {
        human_additions: read_count(root, "human_additions"),
        mixed_additions: read_count(root, "mixed_additions"),
        ai_additions: read_count(root, "ai_additions"),
        ai_accepted: read_count(root, "ai_accepted"),
        total_ai_additions: read_count(root, "total_ai_additions"),
        total_ai_deletions: read_count(root, "total_ai_deletions"),
        git_diff_added_lines: read_count(root, "git_diff_added_lines"),
        git_diff_deleted_lines: read_count(root, "git_diff_deleted_lines"),
        time_waiting_for_ai: read_seconds(root, "time_waiting_for_ai"),
    }
}

fn read_count(root: &Value, field: &str) -> u64 {
    match root.get(field) {
        Some(Value::Number(number)) => number.as_u64().unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn read_seconds(root: &Value, field: &str) -> f64 {
    let seconds = match root.get(field) {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    }
}

/// Splits a `hash|||short|||author|||subject` log line. The subject may itself
/// contain the separator.
pub fn parse_log_line(line: &str) -> Option<(String, String, String, String)> {
    let mut parts = line.splitn(4, LOG_FIELD_SEPARATOR);
    let hash = parts.next()?.trim();
    let short_hash = parts.next()?.trim();
    let author = parts.next()?;
    let subject = parts.next()?;
    if hash.is_empty() {
        return None;
    }
    Some((
        hash.to_string(),
        short_hash.to_string(),
        author.to_string(),
        subject.to_string(),
    ))
}

pub struct StatsQuery {
    git: PathBuf,
    git_ai: PathBuf,
    timeout: Duration,
}

impl StatsQuery {
    pub fn new(git: PathBuf, git_ai: PathBuf, timeout: Duration) -> Self {
        Self {
            git,
            git_ai,
            timeout,
        }
    }

    /// Stats for the last `depth` commits of `repo`. Commits whose stats
    /// cannot be read are skipped; `None` when nothing could be analysed.
    pub fn recent_stats(&self, repo: &Path, depth: u32) -> Option<RecentStats> {
        if depth < 1 {
            return None;
        }

        let log_args = vec![
            "log".to_string(),
            "-n".to_string(),
            depth.to_string(),
            LOG_FORMAT.to_string(),
            "HEAD".to_string(),
        ];
        let log_output = self.run_capture(&self.git, &log_args, repo)?;

        let mut commits = Vec::new();
        for line in log_output.lines().filter(|line| !line.trim().is_empty()) {
            let Some((hash, short_hash, author, subject)) = parse_log_line(line) else {
                continue;
            };
            let stats_args = vec!["stats".to_string(), hash.clone(), "--json".to_string()];
            let Some(stats_json) = self.run_capture(&self.git_ai, &stats_args, repo) else {
                continue;
            };
            commits.push(CommitSummary {
                hash,
                short_hash,
                author,
                subject,
                stats: parse_commit_stats(&stats_json),
            });
        }

        if commits.is_empty() {
            return None;
        }

        let mut aggregated = CommitStats::default();
        for commit in &commits {
            aggregated.accumulate(&commit.stats);
        }
        Some(RecentStats {
            aggregated,
            commits,
        })
    }

    fn run_capture(&self, program: &Path, args: &[String], repo: &Path) -> Option<String> {
        match run_with_timeout(program, args, repo, self.timeout) {
            Ok(output) if output.success => Some(output.stdout),
            Ok(output) => {
                tracing::debug!(
                    command = %describe(program, args),
                    code = ?output.code,
                    "Stats command failed"
                );
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "Stats command error");
                None
            }
        }
    }
}
