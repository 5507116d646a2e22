pub mod config;
pub mod delivery;
pub mod device;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod lookup;
pub mod output;
pub mod pipeline;
pub mod protocol;
pub mod sheet;
pub mod steamtrap;
pub mod store;
pub mod validate;
