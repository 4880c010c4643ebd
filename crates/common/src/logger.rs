use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

const DEFAULT_DIRECTIVES: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn";

/// Compact coloured output on stdout, plus a plain-text copy appended to `logging.file` when set.
pub fn setup_logger(config: &LoggingConfig) -> io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(true)
        .compact();

    let file_layer = match &config.file {
        Some(path) => Some(
            fmt::layer()
                .with_writer(open_log_file(path)?)
                .with_ansi(false)
                .with_target(true)
                .with_level(true),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Opens `path` for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> io::Result<Arc<File>> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}
