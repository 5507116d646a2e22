use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;

/// Generates Bolt configuration downlinks from a parameter sheet.
#[derive(Debug, Parser)]
pub struct Args {
    /// Generation configuration (JSON).
    #[arg(long, env = "GEN_DOWNLINKS_CONFIG")]
    pub config: PathBuf,

    /// Overrides `logging.level`; `RUST_LOG` overrides both.
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,

    /// Writes the per-row report as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
}
