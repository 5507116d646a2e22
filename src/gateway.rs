//! Milesight UG6x gateway management API.

mod http;
mod session;
mod wire;

use async_trait::async_trait;

pub use http::*;
pub use session::*;
pub use wire::*;

use crate::device::DeviceIdentifier;
use crate::error::GatewayError;

/// Calls the delivery engine makes against a gateway.
///
/// Implementations hold no per-device state; every call stands alone apart
/// from the login session.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn authenticate(&self) -> Result<(), GatewayError>;

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, GatewayError>;

    async fn list_applications(&self) -> Result<Vec<ApplicationInfo>, GatewayError>;

    async fn get_queue(&self, deveui: &DeviceIdentifier) -> Result<Vec<QueueItem>, GatewayError>;

    async fn flush_queue(&self, deveui: &DeviceIdentifier) -> Result<(), GatewayError>;

    async fn enqueue_downlink(
        &self,
        deveui: &DeviceIdentifier,
        request: &EnqueueRequest,
    ) -> Result<(), GatewayError>;

    async fn get_delivery_status(
        &self,
        deveui: &DeviceIdentifier,
    ) -> Result<DeliveryStatus, GatewayError>;
}
