//! `attrib-hook stats`: authorship summary for the last few commits.

use attrib_core::config::AttribConfig;
use attrib_core::sink::resolve_git_ai_binary;
use attrib_core::stats::{CommitStats, RecentStats};
use attrib_core::StatsQuery;
use std::path::{Path, PathBuf};

pub const DEFAULT_DEPTH: u32 = 10;

pub fn run(config: &AttribConfig, repo: &Path, depth: u32, json: bool) -> Result<(), String> {
    let query = StatsQuery::new(
        PathBuf::from("git"),
        resolve_git_ai_binary(config.sink.binary.as_deref()),
        config.sink.timeout(),
    );

    let recent = query
        .recent_stats(repo, depth)
        .ok_or_else(|| format!("No authorship stats available for {}", repo.display()))?;

    if json {
        let rendered = serde_json::to_string_pretty(&recent)
            .map_err(|err| format!("Failed to serialize stats: {}", err))?;
        println!("{}", rendered);
    } else {
        print!("{}", render_text(&recent));
    }
    Ok(())
}

fn render_split(stats: &CommitStats) -> String {
    match stats.breakdown() {
        Some(split) => format!(
            "AI {}% | Mixed {}% | Human {}%",
            split.ai_pct, split.mixed_pct, split.human_pct
        ),
        None => "no additions".to_string(),
    }
}

pub fn render_text(recent: &RecentStats) -> String {
    let aggregated = &recent.aggregated;
    let mut out = format!(
        "Last {} commits: {}\n",
        recent.commits.len(),
        render_split(aggregated)
    );
    out.push_str(&format!(
        "Diff +{} -{} lines, AI deletions {}\n",
        aggregated.git_diff_added_lines,
        aggregated.git_diff_deleted_lines,
        aggregated.total_ai_deletions
    ));
    for commit in &recent.commits {
        out.push_str(&format!(
            "  {} {:<40} {} ({})\n",
            commit.short_hash,
            truncate(&commit.subject, 40),
            render_split(&commit.stats),
            commit.author
        ));
    }
    out
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
