use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install stderr and daily-file tracing output.
///
/// The returned guard flushes the file writer on drop and must live until
/// the process exits.
pub fn init(log_dir: &Path, verbose: bool) -> WorkerGuard {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("vyncr_cache={default_level},warn")));

  let file_appender = tracing_appender::rolling::daily(log_dir, "vyncr-cache.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .with(fmt::layer().with_writer(file_writer).with_ansi(false))
    .init();

  guard
}
