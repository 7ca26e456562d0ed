//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "tablesync=info";
const VERBOSE_FILTER: &str = "tablesync=debug";

fn filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter> {
  if let Ok(filter) = EnvFilter::try_from_default_env() {
    return Ok(filter);
  }
  let directives = match (&config.filter, verbose) {
    (_, true) => VERBOSE_FILTER,
    (Some(filter), false) => filter.as_str(),
    (None, false) => DEFAULT_FILTER,
  };
  EnvFilter::try_new(directives).map_err(|e| eyre!("Invalid log filter {:?}: {}", directives, e))
}

/// Where `watch` writes its log when none is configured.
pub fn default_log_file() -> PathBuf {
  dirs::data_local_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("tablesync")
    .join("tablesync.log")
}

/// Install the global subscriber.
///
/// With `to_file` the log goes to the configured file (or
/// [`default_log_file`]) through a background writer, keeping the terminal
/// free for live output. The returned guard flushes it on drop.
pub fn init(config: &LoggingConfig, verbose: bool, to_file: bool) -> Result<Option<WorkerGuard>> {
  let filter = filter(config, verbose)?;

  if !to_file {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_target(false)
      .with_writer(std::io::stderr)
      .try_init()
      .map_err(|e| eyre!("Failed to install logger: {}", e))?;
    return Ok(None);
  }

  let path = config.file.clone().unwrap_or_else(default_log_file);
  let dir = path
    .parent()
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("."));
  std::fs::create_dir_all(&dir).map_err(|e| eyre!("Failed to create log dir {}: {}", dir.display(), e))?;
  let name = path
    .file_name()
    .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;

  let appender = tracing_appender::rolling::never(&dir, name);
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_ansi(false)
    .with_writer(writer)
    .try_init()
    .map_err(|e| eyre!("Failed to install logger: {}", e))?;

  Ok(Some(guard))
}
