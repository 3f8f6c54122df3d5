//! Logger Module
//!
//! A logging system based on `tracing-subscriber` with support for:
//! - Console output with color control
//! - File output with multiple formats (Full, Compact, JSON)
//! - Fallback to stderr when the log file stops accepting writes

pub mod config;
pub mod error;
pub(crate) mod writer;

pub use config::*;
pub use error::LoggerError;

use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use writer::LogFileWriter;

/// Initialize the global subscriber with the given configuration.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logger(config: LoggerConfig) -> Result<(), LoggerError> {
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if !config.file.enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer(&config))
            .try_init()?;
        return Ok(());
    }

    let writer = LogFileWriter::new(&config.file)?;

    // The file layer goes first so console ANSI settings do not leak into
    // span fields written to the file.
    match config.file.format {
        LogFormat::Full => {
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(console_layer(&config))
                .try_init()?;
        }
        LogFormat::Compact => {
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .compact()
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(console_layer(&config))
                .try_init()?;
        }
        LogFormat::Json => {
            let file_layer = fmt::layer().with_ansi(false).json().with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(console_layer(&config))
                .try_init()?;
        }
    }

    Ok(())
}

/// Console layer for one subscriber stack. Built per stack since the layer
/// type depends on the layers beneath it.
fn console_layer<S>(config: &LoggerConfig) -> Option<fmt::Layer<S>> {
    let use_ansi = config.console.colored && std::io::stdout().is_terminal();
    config.console.enabled.then(|| {
        fmt::layer()
            .with_ansi(use_ansi)
            .with_target(true)
            .with_level(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // The only test installing the global subscriber.
    #[test]
    fn test_init_with_console_and_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subtrack.log");
        let file = FileConfig::new(true, path.clone(), false, LogFormat::Json).unwrap();
        let config = LoggerConfig::new(ConsoleConfig::new(true, false), file, "info".into()).unwrap();

        init_logger(config).unwrap();
        tracing::error!(marker = "logger-test", "written to file");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("logger-test"));
        assert!(content.trim_start().starts_with('{'));
    }
}
