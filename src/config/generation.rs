use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{LoggingConfig, resolve_path};
use crate::error::ConfigError;
use crate::protocol::EncoderSettings;
use crate::store::DuplicatePolicy;

/// Network server the generated downlinks are meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServerProfile {
    #[default]
    #[serde(rename = "UG6x")]
    Ug6x,
}

impl ServerProfile {
    pub fn default_port(&self) -> u16 {
        match self {
            ServerProfile::Ug6x => 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InputConfig {
    pub filepath: PathBuf,

    /// Lines above the header row.
    #[serde(default)]
    pub skip_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LookupConfig {
    /// Directory holding one CSV export per workbook sheet.
    pub workbook: PathBuf,

    /// Threshold decision matrix.
    #[serde(default = "default_threshold_sheet")]
    pub sheet1: String,

    /// Saturated steam P-T table.
    #[serde(default = "default_steam_sheet")]
    pub sheet2: String,
}

fn default_threshold_sheet() -> String {
    "conf-table".to_owned()
}

fn default_steam_sheet() -> String {
    "pt-table".to_owned()
}

impl LookupConfig {
    pub fn threshold_table_path(&self) -> PathBuf {
        self.workbook.join(format!("{}.csv", self.sheet1))
    }

    pub fn steam_table_path(&self) -> PathBuf {
        self.workbook.join(format!("{}.csv", self.sheet2))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DownlinkConfig {
    pub fport: u8,

    #[serde(default = "yes")]
    pub confirmed: bool,

    #[serde(default)]
    pub flush_queue: bool,

    /// Seconds between uplinks once configured.
    pub uplink_frequency: u32,

    #[serde(default)]
    pub reset_error_counters: bool,
}

fn yes() -> bool {
    true
}

impl DownlinkConfig {
    pub fn encoder_settings(&self) -> Result<EncoderSettings, ConfigError> {
        EncoderSettings::new(self.fport, self.uplink_frequency, self.reset_error_counters)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutputConfig {
    pub filepath: PathBuf,

    #[serde(default = "default_indent")]
    pub indent: usize,

    /// Where to write a transmission configuration skeleton, if anywhere.
    #[serde(default)]
    pub transmission_config: Option<PathBuf>,
}

fn default_indent() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerationConfig {
    pub input: InputConfig,

    pub lookup: LookupConfig,

    pub downlinks: DownlinkConfig,

    pub output: OutputConfig,

    #[serde(default)]
    pub server: ServerProfile,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GenerationConfig {
    /// Loads and checks a configuration; relative paths follow the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config: Self = crate::config::load_json(path)?;
        config.resolve_paths(&crate::config::config_dir(path));
        config.downlinks.encoder_settings()?;
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        self.input.filepath = resolve_path(base, &self.input.filepath);
        self.lookup.workbook = resolve_path(base, &self.lookup.workbook);
        self.output.filepath = resolve_path(base, &self.output.filepath);
        if let Some(skeleton) = &mut self.output.transmission_config {
            *skeleton = resolve_path(base, skeleton);
        }
        if let Some(logs) = &mut self.logging.logs_directory {
            *logs = resolve_path(base, logs);
        }
    }
}
