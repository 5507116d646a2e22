use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::error::OutputError;

/// Writes gateway snapshots as timestamped JSON files under one directory per gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSink {
    dir: PathBuf,
}

impl BackupSink {
    pub fn new(root: impl AsRef<Path>, gateway: &str) -> Self {
        let label: String = gateway
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();

        Self {
            dir: root.as_ref().join(label),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, OutputError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = self.dir.join(format!("{stamp}-{name}.json"));
        let json = serde_json::to_vec_pretty(value)?;

        let io_err = |source| OutputError::Io {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        tokio::fs::write(&path, json).await.map_err(io_err)?;
        debug!(path = %path.display(), "wrote backup");

        Ok(path)
    }
}
