use crate::device::DeviceIdentifier;
use crate::lookup::{SteamState, Thresholds};
use crate::steamtrap::{MountingType, SteamTrapType};

/// One raw input row, as read from the parameter sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterRecord {
    pub row: usize,

    pub deveui: Option<String>,

    pub stt: Option<String>,

    pub dmt: Option<String>,

    pub sst: Option<String>,

    pub dn: Option<String>,

    pub dp: Option<String>,

    pub hardware_model: Option<String>,

    pub condensate_load: Option<String>,

    pub server: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureTrap {
    pub deveui: DeviceIdentifier,

    pub mounting: MountingType,

    pub sst_celsius: f64,

    pub steam: SteamState,

    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatTrap {
    pub deveui: DeviceIdentifier,

    pub mounting: MountingType,

    pub dn_mm: u16,

    pub dp_bar: f64,

    pub steam: SteamState,

    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedRecord {
    Bimetallic(TemperatureTrap),
    Membrane(TemperatureTrap),
    BallFloat(FloatTrap),
}

impl ValidatedRecord {
    pub fn trap_type(&self) -> SteamTrapType {
        match self {
            ValidatedRecord::Bimetallic(_) => SteamTrapType::Bimetallic,
            ValidatedRecord::Membrane(_) => SteamTrapType::Membrane,
            ValidatedRecord::BallFloat(_) => SteamTrapType::BallFloat,
        }
    }

    pub fn deveui(&self) -> DeviceIdentifier {
        match self {
            ValidatedRecord::Bimetallic(t) | ValidatedRecord::Membrane(t) => t.deveui,
            ValidatedRecord::BallFloat(t) => t.deveui,
        }
    }

    pub fn mounting(&self) -> MountingType {
        match self {
            ValidatedRecord::Bimetallic(t) | ValidatedRecord::Membrane(t) => t.mounting,
            ValidatedRecord::BallFloat(t) => t.mounting,
        }
    }

    pub fn steam(&self) -> SteamState {
        match self {
            ValidatedRecord::Bimetallic(t) | ValidatedRecord::Membrane(t) => t.steam,
            ValidatedRecord::BallFloat(t) => t.steam,
        }
    }

    /// Effective thresholds, UNA pipe-size correction already applied.
    pub fn thresholds(&self) -> Thresholds {
        match self {
            ValidatedRecord::Bimetallic(t) | ValidatedRecord::Membrane(t) => t.thresholds,
            ValidatedRecord::BallFloat(t) => t.thresholds,
        }
    }
}
