//! File logging for the hook binary.
//!
//! stdout belongs to command output, so logs go to a daily rolling file in
//! `~/.attrib/logs`. Level comes from `ATTRIB_HOOK_LOG` (default `warn`).

use attrib_core::config::get_attrib_dir;
use fs_err as fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ATTRIB_HOOK_LOG";
const LOG_FILE_PREFIX: &str = "attrib-hook.log";

/// Installs the subscriber. Keep the guard alive for the whole process so
/// buffered lines are flushed on exit. Returns `None` when logging could not
/// be set up; the hook keeps working without it.
pub fn init() -> Option<WorkerGuard> {
    let dir = get_attrib_dir()?.join("logs");
    fs::create_dir_all(&dir).ok()?;

    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;

    Some(guard)
}
