use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;

/// Delivers generated downlinks through Milesight UG6x gateways.
#[derive(Debug, Parser)]
pub struct Args {
    /// Transmission configuration (JSON).
    #[arg(long, env = "UG6X_CONF_CONFIG")]
    pub config: PathBuf,

    /// Overrides `logging.level`; `RUST_LOG` overrides both.
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,

    /// Writes the per-device delivery report as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
}
