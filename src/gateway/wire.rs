use std::collections::HashSet;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::DeviceIdentifier;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,

    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub jwt: String,
}

/// Device properties as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(rename = "devEUI")]
    pub dev_eui: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePage {
    pub total_count: usize,

    #[serde(default)]
    pub device_result: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPage {
    pub total_count: usize,

    #[serde(default)]
    pub result: Vec<ApplicationInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    #[serde(default)]
    pub fport: Option<u8>,

    #[serde(default)]
    pub confirmed: Option<bool>,

    #[serde(default)]
    pub data: Option<String>,

    #[serde(default)]
    pub reference: Option<String>,

    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePage {
    pub total_count: usize,

    #[serde(default)]
    pub device_queue_items: Vec<QueueItem>,
}

/// Body of `POST /devices/{devEUI}/queue`; one fragment per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    #[serde(rename = "devEUI")]
    pub dev_eui: DeviceIdentifier,

    pub fport: u8,

    pub confirmed: bool,

    /// Base64 of the fragment bytes.
    pub data: String,

    pub reference: String,
}

impl EnqueueRequest {
    pub fn new(
        dev_eui: DeviceIdentifier,
        fport: u8,
        confirmed: bool,
        bytes: &[u8],
        reference: impl Into<String>,
    ) -> Self {
        Self {
            dev_eui,
            fport,
            confirmed,
            data: STANDARD.encode(bytes),
            reference: reference.into(),
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AckEvent {
    pub reference: String,

    #[serde(default)]
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AckEventPage {
    #[serde(default)]
    pub result: Vec<AckEvent>,
}

/// Enqueue references the device has acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStatus {
    pub acknowledged: HashSet<String>,
}

impl DeliveryStatus {
    pub fn acknowledges_all<S: AsRef<str>>(&self, references: &[S]) -> bool {
        !references.is_empty()
            && references
                .iter()
                .all(|r| self.acknowledged.contains(r.as_ref()))
    }
}

impl From<AckEventPage> for DeliveryStatus {
    fn from(page: AckEventPage) -> Self {
        Self {
            acknowledged: page
                .result
                .into_iter()
                .filter(|e| e.acknowledged)
                .map(|e| e.reference)
                .collect(),
        }
    }
}
