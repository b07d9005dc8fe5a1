use std::path::Path;

use ecrypto_config::{LogTarget, LoggingConfigToml};
use tracing_subscriber::EnvFilter;

use crate::error::{ShellError, ShellResult};

/// Installs the global subscriber. Stdout stays reserved for the host channel.
pub fn init_logging(config: &LoggingConfigToml) -> ShellResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directive.as_str()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.target {
        LogTarget::Stderr => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogTarget::File => {
            let log_file = open_log_file(Path::new(config.file.as_str()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(log_file))
                .try_init()
        }
    }
    .map_err(|error| ShellError::Logging(error.to_string()))
}

fn open_log_file(log_path: &Path) -> ShellResult<std::fs::File> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ShellError::Logging(format!(
                    "failed to create log directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|error| {
            ShellError::Logging(format!(
                "failed to open log file '{}': {error}",
                log_path.display()
            ))
        })
}
