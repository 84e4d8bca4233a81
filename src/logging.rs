use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "GHCACHE_LOG";
const DEFAULT_FILTER: &str = "ghcache=info";

/// Send log output to a daily rolling file so stdout only carries results.
///
/// The returned guard flushes buffered lines on drop and must be held until exit.
pub fn init() -> Result<Option<WorkerGuard>> {
  let Some(dir) = log_dir() else {
    return Ok(None);
  };
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "ghcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(filter())
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(Some(guard))
}

fn filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("ghcache").join("logs"))
}
