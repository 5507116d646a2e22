//! Stage configuration files (JSON, camelCase keys).

mod generation;
mod transmission;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use generation::*;
pub use transmission::*;

use crate::error::ConfigError;

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;

    serde_json::from_slice(&raw).map_err(|source| ConfigError::Json {
        path: path.to_owned(),
        source,
    })
}

/// Resolves `path` against the directory holding the configuration file.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        base.join(path)
    }
}

pub fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(Path::to_owned)
        .unwrap_or_default()
}

pub(crate) fn seconds(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| ConfigError::Invalid(format!("{field} must be a positive number of seconds, got {secs}")))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Directory for per-run log files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_directory: Option<PathBuf>,
}
