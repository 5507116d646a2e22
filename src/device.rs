use std::fmt;
use std::str::FromStr;

use macaddr::MacAddr8;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DeviceIdentifierError;

/// EUI-64 of a Bolt device, rendered as 16 uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentifier(MacAddr8);

impl DeviceIdentifier {
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(MacAddr8::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.as_bytes()))
    }
}

impl FromStr for DeviceIdentifier {
    type Err = DeviceIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.trim().chars().filter(|c| !matches!(c, ':' | '-')).collect();

        if digits.len() != 16 {
            return Err(DeviceIdentifierError {
                value: s.to_owned(),
                reason: "expected 16 hex digits",
            });
        }

        let mut bytes = [0u8; 8];
        hex::decode_to_slice(&digits, &mut bytes).map_err(|_| DeviceIdentifierError {
            value: s.to_owned(),
            reason: "not a hex string",
        })?;

        Ok(Self::new(bytes))
    }
}

impl Serialize for DeviceIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
