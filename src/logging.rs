//! Console and file logging for the binaries.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::error::ConfigError;

pub fn parse_level(level: &str) -> Result<Level, ConfigError> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(ConfigError::Invalid(format!("unknown log level {other:?}"))),
    }
}

/// Log file name for a run started now, e.g. `2024-05-01T14-03-22.log`.
pub fn log_file_path(directory: &Path, timezone: Tz) -> PathBuf {
    let stamp = Utc::now().with_timezone(&timezone).format("%Y-%m-%dT%H-%M-%S");
    directory.join(format!("{stamp}.log"))
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Returns the log file path when a directory is given.
pub fn init(level: &str, directory: Option<&Path>, timezone: Tz) -> Result<Option<PathBuf>, ConfigError> {
    let level = parse_level(level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, path) = match directory {
        Some(directory) => {
            fs::create_dir_all(directory).map_err(|source| ConfigError::Io {
                path: directory.to_owned(),
                source,
            })?;
            let path = log_file_path(directory, timezone);
            let file = File::create(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::Invalid(format!("logging already initialized: {e}")))?;

    Ok(path)
}
