use std::path::Path;

use anyhow::{Context, Result};
use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Logs go to stderr and, when `log_file` is
/// set, also to that file. The returned guard must outlive the run so the
/// file writer gets flushed.
pub fn init_logger(log_level: String, log_file: Option<String>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(Rfc3339))
        .with_target(false);

    let (file_layer, guard) = match log_file {
        Some(log_file) => {
            let path = Path::new(&log_file);
            let directory = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file has no file name: {}", log_file))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(LocalTime::new(Rfc3339))
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .with(ErrorLayer::default())
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
