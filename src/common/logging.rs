use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use super::session::SessionId;

/// Install the global subscriber: a persistent per-session log file, plus
/// stderr output when `verbose` is set.
///
/// The returned guard must be held until the program exits, otherwise
/// buffered log lines are lost.
pub fn init(logs_dir: &Path, session: &SessionId, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create logs dir: {}", logs_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(logs_dir, session.log_file_name());
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "vscrub=debug" } else { "vscrub=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
    let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    tracing::info!(session = %session, "vscrub v{}", env!("CARGO_PKG_VERSION"));
    Ok(guard)
}

/// Path of the log file written for `session`
pub fn session_log_path(logs_dir: &Path, session: &SessionId) -> PathBuf {
    logs_dir.join(session.log_file_name())
}
