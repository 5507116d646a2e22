use std::fmt;
use std::str::FromStr;

use crate::error::UnknownMountingTypeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountingType {
    PressureBearingScrew,
    Adapter,
    RetroFitClamp,
}

impl MountingType {
    pub const ALL: [MountingType; 3] = [
        MountingType::PressureBearingScrew,
        MountingType::Adapter,
        MountingType::RetroFitClamp,
    ];

    pub fn phrase(&self) -> &'static str {
        match self {
            MountingType::PressureBearingScrew => "PBS",
            MountingType::Adapter => "ADP",
            MountingType::RetroFitClamp => "RFC",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MountingType::PressureBearingScrew => "pressure-bearing-screw",
            MountingType::Adapter => "adapter",
            MountingType::RetroFitClamp => "retro-fit-clamp",
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MountingType::PressureBearingScrew => 0,
            MountingType::Adapter => 1,
            MountingType::RetroFitClamp => 2,
        }
    }
}

impl fmt::Display for MountingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

impl FromStr for MountingType {
    type Err = UnknownMountingTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| {
                m.phrase().eq_ignore_ascii_case(s)
                    || m.description().eq_ignore_ascii_case(s)
                    || s.parse::<u8>() == Ok(m.code())
            })
            .ok_or_else(|| UnknownMountingTypeError(s.to_owned()))
    }
}
