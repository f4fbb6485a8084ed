//! Logging utilities for CLI commands

use mrdice_core::Config;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize logging for read-only commands (console only)
pub fn init_cli_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();
}

/// Initialize logging for commands that mutate the fleet.
///
/// The tracing transcript goes to `<log_dir>/dicectl.log`, so every deploy
/// and stop leaves an audit trail; the console stays reserved for the
/// command's own reporting. Falls back to console logging when the log dir
/// is unusable.
///
/// Returns the guard that must be kept alive for the duration of the program
pub fn init_command_logging() -> Option<WorkerGuard> {
  let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
  let log_dir = match Config::load(&cwd) {
    Ok(config) => config.log_dir(),
    Err(_) => {
      // The command reports the config error itself.
      init_cli_logging();
      return None;
    }
  };

  if std::fs::create_dir_all(&log_dir).is_err() {
    init_cli_logging();
    return None;
  }

  // Allow RUST_LOG override
  let env_filter = EnvFilter::builder()
    .with_default_directive(tracing::Level::INFO.into())
    .from_env_lossy();

  let file_appender = tracing_appender::rolling::never(&log_dir, "dicectl.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}
