//! Global subscriber setup: stdout always, plus an optional rolling file
//! appender when `logging.enable_file_logging` is on.

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, registry, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber.
///
/// The level directive comes from `logging.level` when configured, falling
/// back to `RUST_LOG`, then to `info`.
pub fn init_with_config(cfg: &LoggingConfig) {
    let filter = match &cfg.level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let file_writer = if cfg.enable_file_logging {
        rolling_writer(cfg)
    } else {
        None
    };

    match cfg.format {
        LogFormat::Json => {
            let stdout_layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339());
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(writer)
            });
            let _ = registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .try_init();
        }
        LogFormat::Text => {
            let stdout_layer = fmt::layer().with_timer(UtcTime::rfc_3339());
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(writer)
            });
            let _ = registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .try_init();
        }
    }
}

/// Non-blocking writer onto a rolling log file. Returns `None` (and keeps
/// stdout logging only) when the log directory cannot be created.
fn rolling_writer(cfg: &LoggingConfig) -> Option<tracing_appender::non_blocking::NonBlocking> {
    if let Err(err) = std::fs::create_dir_all(&cfg.dir) {
        eprintln!(
            "cannot create log directory '{}': {err}; file logging disabled",
            cfg.dir
        );
        return None;
    }

    let rotation = match cfg.rotation.to_lowercase().as_str() {
        "hourly" => tracing_appender::rolling::Rotation::HOURLY,
        "never" => tracing_appender::rolling::Rotation::NEVER,
        _ => tracing_appender::rolling::Rotation::DAILY,
    };
    let appender =
        tracing_appender::rolling::RollingFileAppender::new(rotation, &cfg.dir, &cfg.filename);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    // The guard stops the writer thread on drop; it must outlive the process.
    std::mem::forget(guard);

    Some(writer)
}
