use std::{env, path::Path};

use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "clipgif.log";

/// Initialize the logging system for the application.
///
/// - Reads the filter from `RUST_LOG`, falling back to `default_level`
/// - Logs to stderr, keeping stdout free for machine-readable output
/// - When `log_dir` is given, also logs to a daily rotated file there
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the lifetime of the program.
pub fn init_logging(
    default_level: &str,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>, SetGlobalDefaultError> {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_owned());

    let console = fmt::Layer::new()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_thread_names(true);

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::Layer::new()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(console)
        .with(file);

    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!(
        "logging initialized{}",
        if guard.is_some() { " with daily rotation" } else { "" }
    );
    Ok(guard)
}
