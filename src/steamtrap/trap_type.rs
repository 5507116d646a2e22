use std::fmt;
use std::str::FromStr;

use crate::error::UnsupportedTypeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SteamTrapType {
    Bimetallic,
    Membrane,
    BallFloat,
}

impl SteamTrapType {
    pub const ALL: [SteamTrapType; 3] = [
        SteamTrapType::Bimetallic,
        SteamTrapType::Membrane,
        SteamTrapType::BallFloat,
    ];

    pub fn phrase(&self) -> &'static str {
        match self {
            SteamTrapType::Bimetallic => "BK",
            SteamTrapType::Membrane => "MK",
            SteamTrapType::BallFloat => "UNA",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SteamTrapType::Bimetallic => "bimetallic",
            SteamTrapType::Membrane => "membrane",
            SteamTrapType::BallFloat => "ball-float",
        }
    }

    /// Firmware code, also the low nibble of the trap type command.
    pub fn code(&self) -> u8 {
        match self {
            SteamTrapType::Bimetallic => 0,
            SteamTrapType::Membrane => 1,
            SteamTrapType::BallFloat => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl fmt::Display for SteamTrapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

impl FromStr for SteamTrapType {
    type Err = UnsupportedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.phrase().eq_ignore_ascii_case(s) || t.description().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnsupportedTypeError(s.to_owned()))
    }
}
