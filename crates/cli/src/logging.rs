//! Logging setup for CLI commands and the daemon process they launch.

use std::path::PathBuf;

use sourcelens_core::config::DaemonConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// The directory sourcelens stores its logs and any per-project state in.
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("SOURCELENS_DATA_DIR") {
    return PathBuf::from(dir);
  }
  dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("sourcelens")
}

pub fn log_file_path() -> PathBuf {
  data_dir().join("sourcelens.log")
}

/// Console-only logging for short-lived CLI commands (`index`, `search`, `stats`, `health`).
pub fn init_cli_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();
}

fn parse_log_level(level: &str) -> tracing::Level {
  match level.to_lowercase().as_str() {
    "off" | "error" => tracing::Level::ERROR,
    "warn" => tracing::Level::WARN,
    "info" => tracing::Level::INFO,
    "debug" => tracing::Level::DEBUG,
    "trace" => tracing::Level::TRACE,
    _ => tracing::Level::INFO,
  }
}

/// Logging for the `serve` subcommand: console with colors in the foreground,
/// a rolling file (per `daemon_config.log_rotation`) when backgrounded.
///
/// Returns the guard that must be kept alive for the duration of the process.
pub fn init_daemon_logging_with_config(foreground: bool, daemon_config: &DaemonConfig) -> Option<WorkerGuard> {
  let level = parse_log_level(&daemon_config.log_level);
  let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

  if foreground {
    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_ansi(true)
      .init();
    return None;
  }

  let log_dir = data_dir();
  if std::fs::create_dir_all(&log_dir).is_err() {
    init_cli_logging();
    return None;
  }

  let file_appender = match daemon_config.log_rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(&log_dir, "sourcelens.log"),
    "never" => tracing_appender::rolling::never(&log_dir, "sourcelens.log"),
    _ => tracing_appender::rolling::daily(&log_dir, "sourcelens.log"),
  };
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}
