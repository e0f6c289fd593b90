//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Install the global subscriber: stderr always, plus a daily rotated file in
/// `<data_dir>/logs` when enabled. Keep the returned guard alive until exit so
/// buffered file output is flushed.
pub fn init(config: &LogConfig, data_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

  let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

  let (file_layer, guard) = match (config.file, data_dir) {
    (true, Some(dir)) => {
      let appender = RollingFileAppender::new(Rotation::DAILY, dir.join("logs"), "vitalsync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer);
      (Some(layer), Some(guard))
    }
    _ => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}
