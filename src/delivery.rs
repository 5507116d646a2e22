//! Confirmed delivery of generated downlinks through a gateway.

mod backup;
mod cancel;
mod orchestrator;
mod report;
mod retry;
mod state;

pub use backup::*;
pub use cancel::*;
pub use orchestrator::*;
pub use report::*;
pub use retry::*;
pub use state::*;
