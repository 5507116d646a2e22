mod steam_table;
mod thresholds;

use std::sync::Arc;

pub use steam_table::*;
pub use thresholds::*;

/// Read-only tables shared by every device pipeline.
#[derive(Debug, Clone)]
pub struct LookupTables {
    pub steam: Arc<SteamTable>,

    pub thresholds: Arc<ThresholdTable>,
}

impl LookupTables {
    pub fn new(steam: SteamTable, thresholds: ThresholdTable) -> Self {
        Self {
            steam: Arc::new(steam),
            thresholds: Arc::new(thresholds),
        }
    }
}
